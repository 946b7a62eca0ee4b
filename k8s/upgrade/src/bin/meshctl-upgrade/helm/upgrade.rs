use crate::{
    common::{
        error::{Result, U8VectorToString, UpgraderOptionsAbsent, YamlParseFromSlice},
        file::write_to_tempfile,
        kube_client::KubeClientSet,
    },
    helm::{
        chart::ChartFiles,
        client::{HelmReleaseClient, HelmUpgradeArgs},
        values::{merge_deploy_values, Values},
    },
    mesh_config::{previous_mesh_config, MeshConfig},
    upgrade::{
        crds::{reconcile_crds, CrdAction},
        path::{validate_upgrade_path, version_from_release_chart},
    },
};
use semver::Version;
use serde_yaml::Value;
use snafu::ResultExt;
use std::{
    path::{Path, PathBuf},
    str,
    time::Duration,
};
use tracing::{debug, info};

/// This is a builder for the mesh upgrade.
#[derive(Default)]
pub(crate) struct MeshUpgraderBuilder {
    namespace: Option<String>,
    kubeconfig: Option<PathBuf>,
    release_name: Option<String>,
    chart_dir: Option<PathBuf>,
    image_tag: Option<String>,
    timeout: Option<Duration>,
    dry_run: bool,
    skip_upgrade_path_validation: bool,
}

impl MeshUpgraderBuilder {
    /// This is a builder option to add the Namespace of the helm release to be upgraded.
    #[must_use]
    pub(crate) fn with_namespace<J>(mut self, ns: J) -> Self
    where
        J: ToString,
    {
        self.namespace = Some(ns.to_string());
        self
    }

    /// This is a builder option to point helm at a kubeconfig file.
    #[must_use]
    pub(crate) fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    /// This is a builder option to add the release name of the helm chart to be upgraded.
    #[must_use]
    pub(crate) fn with_release_name<J>(mut self, release_name: J) -> Self
    where
        J: ToString,
    {
        self.release_name = Some(release_name.to_string());
        self
    }

    /// This is a builder option to set the directory of the helm chart to upgrade to.
    #[must_use]
    pub(crate) fn with_chart_dir(mut self, dir: PathBuf) -> Self {
        self.chart_dir = Some(dir);
        self
    }

    /// This is a builder option to pin the container images to a version other than the chart's.
    #[must_use]
    pub(crate) fn with_image_tag(mut self, image_tag: Option<String>) -> Self {
        self.image_tag = image_tag;
        self
    }

    /// This is a builder option to set the time helm waits for the upgraded release.
    #[must_use]
    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// This sets the flag to only render the release.
    #[must_use]
    pub(crate) fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// This sets the flag to skip upgrade path validation.
    #[must_use]
    pub(crate) fn with_skip_upgrade_path_validation(
        mut self,
        skip_upgrade_path_validation: bool,
    ) -> Self {
        self.skip_upgrade_path_validation = skip_upgrade_path_validation;
        self
    }

    /// This builds the MeshUpgrader. The installed release must exist, and the chart must be a
    /// valid upgrade target for it.
    pub(crate) fn build(self) -> Result<MeshUpgrader> {
        let namespace = self.namespace.ok_or(UpgraderOptionsAbsent.build())?;
        let release_name = self.release_name.ok_or(UpgraderOptionsAbsent.build())?;
        let chart_dir = self.chart_dir.ok_or(UpgraderOptionsAbsent.build())?;
        let timeout = self.timeout.ok_or(UpgraderOptionsAbsent.build())?;

        let client = HelmReleaseClient::builder()
            .with_namespace(namespace)
            .with_kubeconfig(self.kubeconfig)
            .build()?;

        // The <chart-name>-<chart-version> string of the installed release.
        let release = client.release_info(release_name.as_str())?;
        let from_version = version_from_release_chart(release.chart())?;

        let chart_files = ChartFiles::load(chart_dir.as_path())?;
        let to_version = chart_files.chart().version().clone();

        validate_upgrade_path(
            &from_version,
            &to_version,
            self.skip_upgrade_path_validation,
        )?;

        let image_tag = self
            .image_tag
            .unwrap_or_else(|| chart_files.chart().default_image_tag());

        Ok(MeshUpgrader {
            release_name,
            client,
            chart_files,
            from_version,
            to_version,
            image_tag,
            timeout,
            dry_run: self.dry_run,
        })
    }
}

/// The result of a successful run.
#[derive(Debug)]
pub(crate) enum UpgradeOutcome {
    /// The rendered manifests of the release. Nothing was changed in the cluster.
    DryRun { manifest: String },
    /// The release was upgraded and these CustomResourceDefinitions were applied.
    Upgraded { crds: Vec<(String, CrdAction)> },
}

/// This type upgrades the installed mesh helm release to the chart in the chart directory.
pub(crate) struct MeshUpgrader {
    release_name: String,
    client: HelmReleaseClient,
    chart_files: ChartFiles,
    from_version: Version,
    to_version: Version,
    image_tag: String,
    timeout: Duration,
    dry_run: bool,
}

impl MeshUpgrader {
    /// This creates a default instance of the MeshUpgraderBuilder.
    pub(crate) fn builder() -> MeshUpgraderBuilder {
        MeshUpgraderBuilder::default()
    }

    /// Merges the values, runs `helm upgrade` and then applies the chart's
    /// CustomResourceDefinitions.
    pub(crate) async fn run(&self, k8s_client: &KubeClientSet) -> Result<UpgradeOutcome> {
        let defaults = self.chart_files.default_values()?;
        let previous = self.previous_values()?;
        let mesh_config =
            previous_mesh_config(k8s_client.configmaps_api(), k8s_client.namespace()).await?;

        let values = upgrade_values(defaults, previous, &mesh_config, self.image_tag.as_str())?;
        info!(
            image_tag = values.image_tag().unwrap_or_default(),
            "Merged upgrade values"
        );
        debug!(?values, "Upgrade values");

        let values_file =
            write_to_tempfile("mesh-values-", ".yaml", values.to_yaml()?.as_slice())?;

        info!(
            release = %self.release_name,
            from = %self.from_version,
            to = %self.to_version,
            "Starting helm upgrade..."
        );
        let output = self
            .client
            .upgrade(HelmUpgradeArgs {
                release_name: self.release_name.as_str(),
                chart_dir: self.chart_dir(),
                values_file: values_file.path(),
                timeout: self.timeout,
                dry_run: self.dry_run,
            })
            .await?;

        // This file is no longer required after the upgrade command has been executed.
        drop(values_file);

        if self.dry_run {
            return Ok(UpgradeOutcome::DryRun { manifest: output });
        }
        info!("Helm upgrade successful!");

        let crds = reconcile_crds(k8s_client.crd_api(), self.chart_files.crds()).await?;

        Ok(UpgradeOutcome::Upgraded { crds })
    }

    /// The deploy-time values of the installed release. Null when the release was installed
    /// without any.
    fn previous_values(&self) -> Result<Value> {
        let buf = self.client.get_values_as_yaml(self.release_name.as_str())?;

        serde_yaml::from_slice(buf.as_slice()).context(YamlParseFromSlice {
            input_yaml: str::from_utf8(buf.as_slice())
                .context(U8VectorToString)?
                .to_string(),
        })
    }

    pub(crate) fn chart_dir(&self) -> &Path {
        self.chart_files.dir()
    }

    pub(crate) fn upgrade_from_version(&self) -> String {
        self.from_version.to_string()
    }

    pub(crate) fn upgrade_to_version(&self) -> String {
        self.to_version.to_string()
    }
}

/// The values of the upgraded release, lowest precedence first: the new chart's defaults, the
/// previous deploy-time values, the previous run-time configuration, and the image tag.
pub(crate) fn upgrade_values(
    defaults: Value,
    previous: Value,
    mesh_config: &MeshConfig,
    image_tag: &str,
) -> Result<Values> {
    let mut values = merge_deploy_values(defaults, previous)?;
    values.apply_runtime_config(mesh_config);
    values.set_image_tag(image_tag);

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::upgrade_values;
    use crate::{
        helm::chart::{tests::chart_dir, ChartFiles},
        mesh_config::MeshConfig,
    };
    use serde_yaml::Value;

    #[test]
    fn precedence_is_defaults_then_deploy_then_runtime_then_tag() {
        let dir = chart_dir();
        let files = ChartFiles::load(dir.path()).unwrap();
        let defaults = files.default_values().unwrap();

        let previous: Value = serde_yaml::from_str(
            r#"
registry:
  server: registry.example.com/mesh
  imageTag: 1.6.0
accessControlMode: deny
nginxLogFormat: json
"#,
        )
        .unwrap();
        let mesh_config: MeshConfig =
            serde_json::from_str(r#"{"accessControlMode":"allow"}"#).unwrap();

        let values = upgrade_values(defaults, previous, &mesh_config, "1.7.0").unwrap();
        let rendered: Value = serde_yaml::from_slice(values.to_yaml().unwrap().as_slice()).unwrap();

        assert_eq!(rendered["registry"]["server"].as_str(), Some("registry.example.com/mesh"));
        assert_eq!(rendered["registry"]["imageTag"].as_str(), Some("1.7.0"));
        assert_eq!(rendered["accessControlMode"].as_str(), Some("allow"));
        assert_eq!(rendered["nginxLogFormat"].as_str(), Some("json"));
    }

    #[test]
    fn release_without_user_values_gets_defaults() {
        let dir = chart_dir();
        let files = ChartFiles::load(dir.path()).unwrap();
        let defaults = files.default_values().unwrap();

        // 'helm get values' prints 'null' for such a release.
        let previous: Value = serde_yaml::from_str("null\n").unwrap();

        let values =
            upgrade_values(defaults, previous, &MeshConfig::default(), "1.7.1").unwrap();
        assert_eq!(values.image_tag(), Some("1.7.1"));

        let rendered: Value = serde_yaml::from_slice(values.to_yaml().unwrap().as_slice()).unwrap();
        assert_eq!(
            rendered["registry"]["server"].as_str(),
            Some("docker-registry.nginx.com/nsm")
        );
    }
}
