use crate::common::{
    constants::{MESH_CONFIG_FILE_NAME, MESH_CONFIG_MAP},
    error::{GetMeshConfigMap, MeshConfigAbsent, MeshConfigParse, Result},
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, ResourceExt};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use tracing::debug;

/// This is the run-time configuration of the mesh, as maintained by the control plane in the
/// mesh-config ConfigMap. Every field is optional; absent fields leave the helm values alone.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MeshConfig {
    pub(crate) access_control_mode: Option<String>,
    pub(crate) load_balancing_method: Option<String>,
    pub(crate) nginx_error_log_level: Option<String>,
    pub(crate) nginx_log_format: Option<String>,
    pub(crate) prometheus_address: Option<String>,
    pub(crate) client_max_body_size: Option<String>,
    pub(crate) mtls: Option<MtlsConfig>,
    pub(crate) injection: Option<InjectionConfig>,
    pub(crate) tracing: Option<TraceConfig>,
    pub(crate) telemetry: Option<TelemetryConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MtlsConfig {
    pub(crate) ca_key_type: Option<String>,
    #[serde(rename = "caTTL")]
    pub(crate) ca_ttl: Option<String>,
    #[serde(rename = "svidTTL")]
    pub(crate) svid_ttl: Option<String>,
    pub(crate) mode: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InjectionConfig {
    pub(crate) is_auto_inject_enabled: Option<bool>,
    pub(crate) enabled_namespaces: Option<Vec<String>>,
    pub(crate) disabled_namespaces: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TraceConfig {
    pub(crate) backend_address: Option<String>,
    pub(crate) backend: Option<String>,
    pub(crate) sample_rate: Option<f64>,
}

impl TraceConfig {
    /// True when tracing has not been configured.
    pub(crate) fn is_empty(&self) -> bool {
        self.eq(&Self::default())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TelemetryConfig {
    pub(crate) sampler_ratio: Option<f64>,
    pub(crate) exporters: Option<ExportersConfig>,
}

impl TelemetryConfig {
    /// True when telemetry has not been configured.
    pub(crate) fn is_empty(&self) -> bool {
        self.eq(&Self::default())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub(crate) struct ExportersConfig {
    pub(crate) otlp: Option<OtlpConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub(crate) struct OtlpConfig {
    pub(crate) host: Option<String>,
    pub(crate) port: Option<u16>,
}

impl TryFrom<&ConfigMap> for MeshConfig {
    type Error = crate::common::error::Error;

    /// The control plane writes the document to binaryData. Older control planes used data.
    fn try_from(config_map: &ConfigMap) -> Result<Self, Self::Error> {
        let name = config_map.name_any();

        let binary = config_map
            .binary_data
            .as_ref()
            .and_then(|data| data.get(MESH_CONFIG_FILE_NAME))
            .map(|bytes| bytes.0.as_slice());
        let text = config_map
            .data
            .as_ref()
            .and_then(|data| data.get(MESH_CONFIG_FILE_NAME))
            .map(String::as_bytes);

        let document = binary.or(text).context(MeshConfigAbsent {
            name: name.clone(),
            namespace: config_map.namespace().unwrap_or_default(),
            key: MESH_CONFIG_FILE_NAME.to_string(),
        })?;

        serde_json::from_slice(document).context(MeshConfigParse { name })
    }
}

/// Reads ConfigMaps from the control plane namespace.
#[async_trait]
pub(crate) trait ConfigMapGetter: Send + Sync {
    async fn get_config_map(&self, name: &str) -> Result<ConfigMap, kube::Error>;
}

#[async_trait]
impl ConfigMapGetter for Api<ConfigMap> {
    async fn get_config_map(&self, name: &str) -> Result<ConfigMap, kube::Error> {
        self.get(name).await
    }
}

/// Fetches the run-time mesh configuration of the installed control plane.
pub(crate) async fn previous_mesh_config<G>(configmaps: &G, namespace: &str) -> Result<MeshConfig>
where
    G: ConfigMapGetter + ?Sized,
{
    let config_map = configmaps
        .get_config_map(MESH_CONFIG_MAP)
        .await
        .context(GetMeshConfigMap {
            name: MESH_CONFIG_MAP.to_string(),
            namespace: namespace.to_string(),
        })?;

    let mesh_config = MeshConfig::try_from(&config_map)?;
    debug!(?mesh_config, "Previous mesh configuration");

    Ok(mesh_config)
}
