use crate::common::constants::{
    DEFAULT_NAMESPACE, DEFAULT_RELEASE_NAME, DEFAULT_UPGRADE_TIMEOUT, PRODUCT,
};
use clap::{ArgAction, Parser};
use std::{path::PathBuf, time::Duration};

/// Validate input whose validation depends on other inputs.
pub(crate) mod validators;

/// These are the supported cli configuration options for upgrade.
#[derive(Parser)]
#[command(name = "meshctl-upgrade", version)]
#[command(about = format!("Upgrades {PRODUCT}"), long_about = format!(
    "Upgrades {PRODUCT}. The installed release is upgraded to the chart in the chart \
    directory, keeping the deploy-time values and the run-time configuration of the mesh."
))]
pub(crate) struct CliArgs {
    /// This is the Kubernetes Namespace of the mesh control plane.
    #[arg(short, long, env = "MESH_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Path to the kubeconfig file. When not set, the KUBECONFIG environment variable or the
    /// in-cluster configuration is used.
    #[arg(short, long, value_name = "FILE_PATH")]
    kubeconfig: Option<PathBuf>,

    /// This is the directory of the helm chart to upgrade to.
    #[arg(long, env = "MESH_CHART_DIR", value_name = "DIR_PATH")]
    chart_dir: PathBuf,

    /// This is the release name of the installed Helm chart.
    #[arg(long, default_value = DEFAULT_RELEASE_NAME)]
    release_name: String,

    /// The version of the container images. Defaults to the appVersion of the chart.
    #[arg(long)]
    image_tag: Option<String>,

    /// Answer yes for confirmation of upgrade.
    #[arg(short, long, default_value_t = false)]
    yes: bool,

    /// Timeout when waiting for an upgrade to finish, e.g. 90s, 5m, 1h.
    #[arg(short, long, default_value = DEFAULT_UPGRADE_TIMEOUT, value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Render the upgrade manifest and print to stdout. Doesn't perform the upgrade.
    #[arg(long, default_value_t = false, hide = true)]
    dry_run: bool,

    /// If set then this skips the upgrade path validation.
    #[arg(long, default_value_t = false, hide = true)]
    skip_upgrade_path_validation: bool,

    /// Use ANSI colors for the logs.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    ansi_colors: bool,
}

impl CliArgs {
    /// This returns the Kubernetes Namespace of the mesh control plane.
    pub(crate) fn namespace(&self) -> String {
        self.namespace.clone()
    }

    /// This returns the kubeconfig filepath, if one was given.
    pub(crate) fn kubeconfig(&self) -> Option<PathBuf> {
        self.kubeconfig.clone()
    }

    /// This returns the directory of the helm chart to upgrade to.
    pub(crate) fn chart_dir(&self) -> PathBuf {
        self.chart_dir.clone()
    }

    /// This returns the Helm release name for the installed Helm chart.
    pub(crate) fn release_name(&self) -> String {
        self.release_name.clone()
    }

    /// This returns the image tag override.
    pub(crate) fn image_tag(&self) -> Option<String> {
        self.image_tag.clone()
    }

    /// This decides to skip the confirmation prompt.
    pub(crate) fn yes(&self) -> bool {
        self.yes
    }

    /// This returns the time to wait for the upgraded release.
    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// This decides to only render the release.
    pub(crate) fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// This decides to skip upgrade path validation or not.
    pub(crate) fn skip_upgrade_path_validation(&self) -> bool {
        self.skip_upgrade_path_validation
    }

    /// This returns ansi_colours arg.
    pub(crate) fn ansi_colours(&self) -> bool {
        self.ansi_colors
    }
}
