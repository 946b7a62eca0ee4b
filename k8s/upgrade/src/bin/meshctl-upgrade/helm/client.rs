use crate::{
    common::error::{
        HelmClientNs, HelmCommand, HelmGetValuesCommand, HelmListCommand, HelmRelease,
        HelmUpgradeCommand, Result, U8VectorToString, YamlParseFromSlice,
    },
    vec_to_strings,
};
use serde::Deserialize;
use snafu::{ensure, ResultExt};
use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
    str,
    time::Duration,
};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// This struct is used to deserialize the output of `helm list -n <namespace> --deployed -o yaml`.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct HelmReleaseElement {
    name: String,
    chart: String,
}

impl HelmReleaseElement {
    /// This is a getter function for the name of the release.
    pub(crate) fn name(&self) -> &str {
        self.name.as_str()
    }
    /// This is a getter function for the chart_name of the release. This also contains the chart
    /// version, e.g. nginx-service-mesh-1.6.0.
    pub(crate) fn chart(&self) -> &str {
        self.chart.as_str()
    }
}

/// The options of a `helm upgrade` run.
pub(crate) struct HelmUpgradeArgs<'a> {
    pub(crate) release_name: &'a str,
    pub(crate) chart_dir: &'a Path,
    pub(crate) values_file: &'a Path,
    pub(crate) timeout: Duration,
    pub(crate) dry_run: bool,
}

/// This is a builder for HelmReleaseClient.
#[derive(Default)]
pub(crate) struct HelmReleaseClientBuilder {
    namespace: Option<String>,
    kubeconfig: Option<PathBuf>,
}

impl HelmReleaseClientBuilder {
    /// This is a builder option to add Namespace. This is mandatory,
    /// because all helm releases are tied to a Namespace.
    #[must_use]
    pub(crate) fn with_namespace<J>(mut self, ns: J) -> Self
    where
        J: ToString,
    {
        self.namespace = Some(ns.to_string());
        self
    }

    /// Point helm at this kubeconfig file, instead of its own default.
    #[must_use]
    pub(crate) fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    /// Build the HelmReleaseClient.
    pub(crate) fn build(self) -> Result<HelmReleaseClient> {
        let ns = self.namespace.ok_or(HelmClientNs.build())?;
        Ok(HelmReleaseClient {
            namespace: ns,
            kubeconfig: self.kubeconfig,
        })
    }
}

/// This type has functions which execute helm commands to fetch info about and modify helm
/// releases.
#[derive(Clone)]
pub(crate) struct HelmReleaseClient {
    namespace: String,
    kubeconfig: Option<PathBuf>,
}

impl HelmReleaseClient {
    /// This creates an empty builder.
    pub(crate) fn builder() -> HelmReleaseClientBuilder {
        HelmReleaseClientBuilder::default()
    }

    /// Arguments shared by every helm command: the namespace and, if set, the kubeconfig.
    fn scope_args(&self) -> Vec<String> {
        let mut args = vec_to_strings!["-n", self.namespace.as_str()];
        if let Some(ref kubeconfig) = self.kubeconfig {
            args.extend(vec_to_strings!["--kubeconfig", kubeconfig.to_string_lossy()]);
        }
        args
    }

    /// Runs command `helm get values <release_name> -n <namespace> -o yaml`. These are the
    /// user-supplied values of the release.
    pub(crate) fn get_values_as_yaml<A>(&self, release_name: A) -> Result<Vec<u8>>
    where
        A: ToString,
    {
        let command: &str = "helm";
        let mut args: Vec<String> = vec_to_strings!["get", "values", release_name];
        args.extend(self.scope_args());

        // Because this option has to be at the end for it to work.
        args.extend(vec_to_strings!["-o", "yaml"]);

        debug!(%command, ?args, "Helm get values command");

        let output = run(command, &args)?;

        ensure!(
            output.status.success(),
            HelmGetValuesCommand {
                command: command.to_string(),
                args,
                std_err: stderr_of(&output)?
            }
        );

        Ok(output.stdout)
    }

    /// Runs command `helm list -n <namespace> --deployed -o yaml`.
    pub(crate) fn list_as_yaml(&self) -> Result<Vec<HelmReleaseElement>> {
        let command: &str = "helm";
        let mut args: Vec<String> = vec_to_strings!["list", "--deployed"];
        args.extend(self.scope_args());

        // Because this option has to be at the end for it to work.
        args.extend(vec_to_strings!["-o", "yaml"]);

        debug!(%command, ?args, "Helm list command");

        let output = run(command, &args)?;

        let stdout_str = str::from_utf8(output.stdout.as_slice()).context(U8VectorToString)?;
        debug!(stdout=%stdout_str, "Helm list command standard output");
        ensure!(
            output.status.success(),
            HelmListCommand {
                command: command.to_string(),
                args,
                std_err: stderr_of(&output)?
            }
        );

        serde_yaml::from_slice(output.stdout.as_slice()).context(YamlParseFromSlice {
            input_yaml: stdout_str.to_string(),
        })
    }

    /// Fetches info about a 'deployed' Helm release in the Namespace, if it exists.
    pub(crate) fn release_info<A>(&self, release_name: A) -> Result<HelmReleaseElement>
    where
        A: ToString,
    {
        let release_name = release_name.to_string();

        self.list_as_yaml()?
            .into_iter()
            .find(|release| release.name().eq(&release_name))
            .ok_or(
                HelmRelease {
                    name: release_name,
                    namespace: self.namespace.clone(),
                }
                .build(),
            )
    }

    /// The arguments of `helm upgrade`. The timeout is given in milliseconds, so that
    /// sub-second timeouts are not truncated.
    fn upgrade_args(&self, upgrade: &HelmUpgradeArgs<'_>) -> Vec<String> {
        let mut args: Vec<String> = vec_to_strings![
            "upgrade",
            upgrade.release_name,
            upgrade.chart_dir.to_string_lossy()
        ];
        args.extend(self.scope_args());
        args.extend(vec_to_strings![
            "--timeout",
            format!("{}ms", upgrade.timeout.as_millis()),
            "-f",
            upgrade.values_file.to_string_lossy(),
            "--atomic"
        ]);
        if upgrade.dry_run {
            args.push("--dry-run".to_string());
        }
        args
    }

    /// Runs command `helm upgrade <release_name> <chart_dir> -n <namespace> -f <values_file>
    /// --atomic`. On failure, helm rolls the release back to its previous revision. The standard
    /// output of helm is returned, which holds the rendered manifests for a dry-run.
    pub(crate) async fn upgrade(&self, upgrade: HelmUpgradeArgs<'_>) -> Result<String> {
        let command: &str = "helm";
        let args = self.upgrade_args(&upgrade);

        debug!(%command, ?args, "Helm upgrade command");

        let output = AsyncCommand::new(command)
            .args(args.clone())
            .output()
            .await
            .context(HelmCommand {
                command: command.to_string(),
                args: args.clone(),
            })?;

        let stdout_str = str::from_utf8(output.stdout.as_slice()).context(U8VectorToString)?;
        debug!(stdout=%stdout_str, "Helm upgrade command standard output");
        ensure!(
            output.status.success(),
            HelmUpgradeCommand {
                command: command.to_string(),
                args,
                std_err: stderr_of(&output)?
            }
        );

        Ok(stdout_str.to_string())
    }
}

/// Runs a command to completion and collects its output.
pub(crate) fn run(command: &str, args: &[String]) -> Result<Output> {
    Command::new(command).args(args).output().context(HelmCommand {
        command: command.to_string(),
        args: args.to_vec(),
    })
}

/// The standard error stream of a finished command, as a String.
pub(crate) fn stderr_of(output: &Output) -> Result<String> {
    Ok(str::from_utf8(output.stderr.as_slice())
        .context(U8VectorToString)?
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::{HelmReleaseClient, HelmReleaseElement, HelmUpgradeArgs};
    use std::{
        path::{Path, PathBuf},
        time::Duration,
    };

    #[test]
    fn release_list_output_is_parsed() {
        let output = r#"- app_version: 1.6.0
  chart: nginx-service-mesh-1.6.0
  name: nginx-service-mesh
  namespace: nginx-mesh
  revision: "1"
  status: deployed
  updated: 2023-01-10 10:11:12.123456 +0000 UTC
"#;
        let releases: Vec<HelmReleaseElement> = serde_yaml::from_str(output).unwrap();

        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].name(), "nginx-service-mesh");
        assert_eq!(releases[0].chart(), "nginx-service-mesh-1.6.0");
    }

    #[test]
    fn scope_args_carry_kubeconfig() {
        let client = HelmReleaseClient::builder()
            .with_namespace("nginx-mesh")
            .with_kubeconfig(Some(PathBuf::from("/tmp/kubeconfig")))
            .build()
            .unwrap();

        assert_eq!(
            client.scope_args(),
            vec!["-n", "nginx-mesh", "--kubeconfig", "/tmp/kubeconfig"]
        );
    }

    #[test]
    fn namespace_is_mandatory() {
        assert!(HelmReleaseClient::builder().build().is_err());
    }

    #[test]
    fn upgrade_args_keep_sub_second_timeouts() {
        let client = HelmReleaseClient::builder()
            .with_namespace("nginx-mesh")
            .build()
            .unwrap();

        let args = client.upgrade_args(&HelmUpgradeArgs {
            release_name: "nginx-service-mesh",
            chart_dir: Path::new("/charts/nginx-service-mesh"),
            values_file: Path::new("/tmp/mesh-values.yaml"),
            timeout: humantime::parse_duration("1500ms").unwrap(),
            dry_run: true,
        });

        assert_eq!(
            args,
            vec![
                "upgrade",
                "nginx-service-mesh",
                "/charts/nginx-service-mesh",
                "-n",
                "nginx-mesh",
                "--timeout",
                "1500ms",
                "-f",
                "/tmp/mesh-values.yaml",
                "--atomic",
                "--dry-run",
            ]
        );
    }

    #[test]
    fn upgrade_args_without_dry_run() {
        let client = HelmReleaseClient::builder()
            .with_namespace("nginx-mesh")
            .build()
            .unwrap();

        let args = client.upgrade_args(&HelmUpgradeArgs {
            release_name: "nginx-service-mesh",
            chart_dir: Path::new("chart"),
            values_file: Path::new("values.yaml"),
            timeout: Duration::from_secs(300),
            dry_run: false,
        });

        assert!(args.contains(&"300000ms".to_string()));
        assert!(!args.contains(&"--dry-run".to_string()));
    }
}
