use crate::{
    common::{
        constants::OPENSHIFT_ENVIRONMENT,
        error::{Result, SerializeValues, UnsupportedEnvironment, YamlParseFromSlice},
    },
    mesh_config::MeshConfig,
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;

/// Helm values which are not modelled by the types below are carried through as they are.
type Extra = BTreeMap<String, Value>;

/// These are the deploy-time values of the mesh chart. Only the values that the upgrade
/// reads or overrides are typed; everything else lives in the flattened 'extra' maps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct Values {
    registry: Registry,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_control_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nginx_error_log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nginx_log_format: Option<String>,
    #[serde(rename = "nginxLBMethod", skip_serializing_if = "Option::is_none")]
    nginx_lb_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_max_body_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prometheus_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disable_auto_injection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled_namespaces: Option<Vec<String>>,
    auto_injection: AutoInjection,
    mtls: Mtls,
    /// A cleared section is serialized as null, so that helm drops the chart default too.
    tracing: Option<Tracing>,
    telemetry: Option<Telemetry>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Registry {
    #[serde(skip_serializing_if = "Option::is_none")]
    image_tag: Option<String>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AutoInjection {
    #[serde(skip_serializing_if = "Option::is_none")]
    disabled_namespaces: Option<Vec<String>>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Mtls {
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<String>,
    #[serde(rename = "caTTL", skip_serializing_if = "Option::is_none")]
    ca_ttl: Option<String>,
    #[serde(rename = "svidTTL", skip_serializing_if = "Option::is_none")]
    svid_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ca_key_type: Option<String>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Tracing {
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<f64>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Telemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    sampler_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exporters: Option<Exporters>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Exporters {
    #[serde(skip_serializing_if = "Option::is_none")]
    otlp: Option<Otlp>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Otlp {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(flatten)]
    extra: Extra,
}

impl TryFrom<Value> for Values {
    type Error = crate::common::error::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let input_yaml = serde_yaml::to_string(&value).unwrap_or_default();
        serde_yaml::from_value(value).context(YamlParseFromSlice { input_yaml })
    }
}

impl Values {
    /// This is a getter for the container image tag.
    pub(crate) fn image_tag(&self) -> Option<&str> {
        self.registry.image_tag.as_deref()
    }

    /// Pins the container images of the release to this version.
    pub(crate) fn set_image_tag<T>(&mut self, tag: T)
    where
        T: ToString,
    {
        self.registry.image_tag = Some(tag.to_string());
    }

    /// This is a getter for the platform the mesh was deployed to.
    pub(crate) fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Copies the run-time mesh configuration on top of the deploy-time values. The run-time
    /// configuration may have been changed through the mesh API after install, so it wins.
    pub(crate) fn apply_runtime_config(&mut self, config: &MeshConfig) {
        set_if_present(&mut self.access_control_mode, &config.access_control_mode);
        set_if_present(&mut self.nginx_lb_method, &config.load_balancing_method);
        set_if_present(&mut self.nginx_error_log_level, &config.nginx_error_log_level);
        set_if_present(&mut self.nginx_log_format, &config.nginx_log_format);
        set_if_present(&mut self.prometheus_address, &config.prometheus_address);
        set_if_present(&mut self.client_max_body_size, &config.client_max_body_size);

        if let Some(mtls) = &config.mtls {
            set_if_present(&mut self.mtls.ca_key_type, &mtls.ca_key_type);
            set_if_present(&mut self.mtls.ca_ttl, &mtls.ca_ttl);
            set_if_present(&mut self.mtls.svid_ttl, &mtls.svid_ttl);
            set_if_present(&mut self.mtls.mode, &mtls.mode);
        }

        if let Some(injection) = &config.injection {
            if let Some(enabled) = injection.is_auto_inject_enabled {
                self.disable_auto_injection = Some(!enabled);
            }
            set_if_present(&mut self.enabled_namespaces, &injection.enabled_namespaces);
            set_if_present(
                &mut self.auto_injection.disabled_namespaces,
                &injection.disabled_namespaces,
            );
        }

        // Tracing and telemetry are mutually exclusive.
        if let Some(trace_config) = config.tracing.as_ref().filter(|t| !t.is_empty()) {
            let tracing = self.tracing.get_or_insert_with(Tracing::default);
            set_if_present(&mut tracing.address, &trace_config.backend_address);
            set_if_present(&mut tracing.backend, &trace_config.backend);
            set_if_present(&mut tracing.sample_rate, &trace_config.sample_rate);
            self.telemetry = None;
        }

        if let Some(telemetry_config) = config.telemetry.as_ref().filter(|t| !t.is_empty()) {
            let telemetry = self.telemetry.get_or_insert_with(Telemetry::default);
            set_if_present(&mut telemetry.sampler_ratio, &telemetry_config.sampler_ratio);

            if let Some(otlp_config) = telemetry_config
                .exporters
                .as_ref()
                .and_then(|exporters| exporters.otlp.as_ref())
            {
                let otlp = telemetry
                    .exporters
                    .get_or_insert_with(Exporters::default)
                    .otlp
                    .get_or_insert_with(Otlp::default);
                set_if_present(&mut otlp.host, &otlp_config.host);
                set_if_present(&mut otlp.port, &otlp_config.port);
            }
            self.tracing = None;
        }
    }

    /// Serializes the values into a helm values YAML document.
    pub(crate) fn to_yaml(&self) -> Result<Vec<u8>> {
        serde_yaml::to_string(self)
            .map(String::into_bytes)
            .context(SerializeValues)
    }
}

fn set_if_present<T>(target: &mut Option<T>, source: &Option<T>)
where
    T: Clone,
{
    if let Some(value) = source {
        *target = Some(value.clone());
    }
}

/// Deep-merges the overlay onto the base. Mappings are merged key by key, recursively. Scalars
/// and sequences in the overlay replace those in the base. A null in the overlay removes the key
/// from the base, so that the base's own default for it no longer applies either.
pub(crate) fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    base_map.remove(&key);
                    continue;
                }
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        // 'helm get values' prints null for a release without user-supplied values.
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

/// This copies the previous release's deploy-time values on top of the new chart's default
/// values, and checks that the resulting deployment can be upgraded by this tool.
pub(crate) fn merge_deploy_values(defaults: Value, previous: Value) -> Result<Values> {
    let mut merged = defaults;
    merge_values(&mut merged, previous);

    let values = Values::try_from(merged)?;

    if let Some(environment) = values.environment() {
        ensure!(
            !environment.eq_ignore_ascii_case(OPENSHIFT_ENVIRONMENT),
            UnsupportedEnvironment {
                environment: environment.to_string()
            }
        );
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::{merge_deploy_values, merge_values, Values};
    use crate::{common::error::Error, mesh_config::MeshConfig};
    use serde_yaml::Value;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    const DEFAULTS: &str = r#"
registry:
  server: docker-registry.nginx.com/nsm
  imageTag: 1.7.0
  imagePullPolicy: IfNotPresent
environment: kubernetes
accessControlMode: allow
nginxErrorLogLevel: warn
nginxLogFormat: default
nginxLBMethod: least_time
clientMaxBodySize: 1m
prometheusAddress: ""
enabledNamespaces: []
autoInjection:
  disabledNamespaces: []
mtls:
  mode: permissive
  caTTL: 720h
  svidTTL: 1h
  caKeyType: ec-p256
  upstreamAuthority: disk
telemetry:
  samplerRatio: 0.01
  exporters:
    otlp:
      host: ""
      port: 4317
"#;

    #[test]
    fn previous_values_override_defaults() {
        let mut base = yaml(DEFAULTS);
        merge_values(
            &mut base,
            yaml("accessControlMode: deny\nmtls:\n  mode: strict\nenabledNamespaces: [bookinfo]\n"),
        );

        assert_eq!(base["accessControlMode"].as_str(), Some("deny"));
        assert_eq!(base["mtls"]["mode"].as_str(), Some("strict"));
        // Sibling keys of a merged mapping are kept.
        assert_eq!(base["mtls"]["caTTL"].as_str(), Some("720h"));
        assert_eq!(base["mtls"]["upstreamAuthority"].as_str(), Some("disk"));
        assert_eq!(base["enabledNamespaces"], yaml("[bookinfo]"));
        assert_eq!(base["nginxLBMethod"].as_str(), Some("least_time"));
    }

    #[test]
    fn sequences_are_replaced_not_appended() {
        let mut base = yaml("autoInjection:\n  disabledNamespaces: [a, b]\n");
        merge_values(&mut base, yaml("autoInjection:\n  disabledNamespaces: [c]\n"));

        assert_eq!(base["autoInjection"]["disabledNamespaces"], yaml("[c]"));
    }

    #[test]
    fn null_removes_the_default() {
        let mut base = yaml(DEFAULTS);
        merge_values(&mut base, yaml("telemetry: null\n"));

        assert!(base.get("telemetry").is_none());
        let values = Values::try_from(base).unwrap();
        assert!(values.telemetry.is_none());
    }

    #[test]
    fn release_without_user_values_keeps_defaults() {
        let values = merge_deploy_values(yaml(DEFAULTS), Value::Null).unwrap();

        assert_eq!(values, Values::try_from(yaml(DEFAULTS)).unwrap());
    }

    #[test]
    fn unknown_values_survive_a_round_trip() {
        let values = merge_deploy_values(yaml(DEFAULTS), yaml("enableUDP: true\n")).unwrap();
        let out: Value = serde_yaml::from_slice(&values.to_yaml().unwrap()).unwrap();

        assert_eq!(out["enableUDP"].as_bool(), Some(true));
        assert_eq!(
            out["registry"]["server"].as_str(),
            Some("docker-registry.nginx.com/nsm")
        );
        assert_eq!(out["mtls"]["upstreamAuthority"].as_str(), Some("disk"));
        assert_eq!(out["telemetry"]["exporters"]["otlp"]["port"].as_u64(), Some(4317));
    }

    #[test]
    fn openshift_deployments_are_rejected() {
        let result = merge_deploy_values(yaml(DEFAULTS), yaml("environment: openshift\n"));

        assert!(matches!(result, Err(Error::UnsupportedEnvironment { .. })));
    }

    #[test]
    fn runtime_config_wins_over_deploy_values() {
        let mut values =
            merge_deploy_values(yaml(DEFAULTS), yaml("accessControlMode: allow\n")).unwrap();
        let config: MeshConfig = serde_json::from_str(
            r#"{
                "accessControlMode": "deny",
                "loadBalancingMethod": "random",
                "nginxErrorLogLevel": "debug",
                "mtls": {"mode": "strict", "caTTL": "24h", "svidTTL": "2h", "caKeyType": "rsa-2048"},
                "injection": {
                    "isAutoInjectEnabled": false,
                    "enabledNamespaces": ["prod"],
                    "disabledNamespaces": ["kube-system"]
                },
                "clientMaxBodySize": "2m"
            }"#,
        )
        .unwrap();

        values.apply_runtime_config(&config);

        assert_eq!(values.access_control_mode.as_deref(), Some("deny"));
        assert_eq!(values.nginx_lb_method.as_deref(), Some("random"));
        assert_eq!(values.nginx_error_log_level.as_deref(), Some("debug"));
        // Absent from the run-time configuration, so the deploy-time value stays.
        assert_eq!(values.nginx_log_format.as_deref(), Some("default"));
        assert_eq!(values.mtls.mode.as_deref(), Some("strict"));
        assert_eq!(values.mtls.ca_ttl.as_deref(), Some("24h"));
        assert_eq!(values.mtls.svid_ttl.as_deref(), Some("2h"));
        assert_eq!(values.mtls.ca_key_type.as_deref(), Some("rsa-2048"));
        assert_eq!(values.disable_auto_injection, Some(true));
        assert_eq!(values.enabled_namespaces, Some(vec!["prod".to_string()]));
        assert_eq!(
            values.auto_injection.disabled_namespaces,
            Some(vec!["kube-system".to_string()])
        );
        assert_eq!(values.client_max_body_size.as_deref(), Some("2m"));
    }

    #[test]
    fn runtime_tracing_replaces_telemetry() {
        let mut values = merge_deploy_values(yaml(DEFAULTS), Value::Null).unwrap();
        let config: MeshConfig = serde_json::from_str(
            r#"{"tracing": {"backendAddress": "zipkin.tracing:9411", "backend": "zipkin", "sampleRate": 0.5}}"#,
        )
        .unwrap();

        values.apply_runtime_config(&config);

        let tracing = values.tracing.as_ref().expect("tracing should be set");
        assert_eq!(tracing.address.as_deref(), Some("zipkin.tracing:9411"));
        assert_eq!(tracing.backend.as_deref(), Some("zipkin"));
        assert_eq!(tracing.sample_rate, Some(0.5));
        assert!(values.telemetry.is_none());

        let out: Value = serde_yaml::from_slice(&values.to_yaml().unwrap()).unwrap();
        assert!(out["telemetry"].is_null());
        assert!(out.get("telemetry").is_some());
    }

    #[test]
    fn runtime_telemetry_replaces_tracing() {
        let mut values = merge_deploy_values(
            yaml(DEFAULTS),
            yaml("telemetry: null\ntracing:\n  address: jaeger:6831\n  backend: jaeger\n"),
        )
        .unwrap();
        let config: MeshConfig = serde_json::from_str(
            r#"{"telemetry": {"samplerRatio": 0.2, "exporters": {"otlp": {"host": "otel-collector", "port": 4318}}}}"#,
        )
        .unwrap();

        values.apply_runtime_config(&config);

        assert!(values.tracing.is_none());
        let telemetry = values.telemetry.as_ref().expect("telemetry should be set");
        assert_eq!(telemetry.sampler_ratio, Some(0.2));
        let otlp = telemetry.exporters.as_ref().and_then(|e| e.otlp.as_ref()).unwrap();
        assert_eq!(otlp.host.as_deref(), Some("otel-collector"));
        assert_eq!(otlp.port, Some(4318));
    }

    #[test]
    fn empty_runtime_sections_change_nothing() {
        let mut values = merge_deploy_values(yaml(DEFAULTS), Value::Null).unwrap();
        let before = values.clone();
        let config: MeshConfig = serde_json::from_str(r#"{"tracing": {}, "telemetry": {}}"#).unwrap();

        values.apply_runtime_config(&config);

        assert_eq!(values, before);
    }

    #[test]
    fn image_tag_is_overridden() {
        let mut values = merge_deploy_values(yaml(DEFAULTS), yaml("registry:\n  imageTag: 1.6.0\n")).unwrap();
        assert_eq!(values.image_tag(), Some("1.6.0"));

        values.set_image_tag("1.7.1");
        assert_eq!(values.image_tag(), Some("1.7.1"));
    }
}
