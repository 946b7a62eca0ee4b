use crate::{
    common::{
        constants::{IMAGE_PULL_CHECK_INTERVAL, PRODUCT, SIDECAR_ROLLOUT_HINT},
        error::Result,
        kube_client::KubeClientSet,
    },
    helm::{
        client::HelmReleaseClient,
        upgrade::{MeshUpgrader, UpgradeOutcome},
    },
    opts::{
        validators::{validate_helm_release, validate_namespace},
        CliArgs,
    },
    upgrade::image_pull::{with_image_pull_failure, ImagePullWatcher},
    user_prompt::confirm,
};
use std::io;
use tracing::info;

/// Contains the idempotent create-or-update of the chart's CustomResourceDefinitions.
pub(crate) mod crds;

/// Contains the background check for Pods which cannot pull their images.
pub(crate) mod image_pull;

/// Contains upgrade path validation.
pub(crate) mod path;

/// This function starts and sees upgrade through to the end.
pub(crate) async fn upgrade(opts: &CliArgs) -> Result<()> {
    let k8s_client = KubeClientSet::builder()
        .with_namespace(opts.namespace())
        .with_kubeconfig(opts.kubeconfig())
        .build()
        .await?;

    // Verify that the mesh is installed.
    validate_namespace(&k8s_client).await?;
    let helm_client = HelmReleaseClient::builder()
        .with_namespace(opts.namespace())
        .with_kubeconfig(opts.kubeconfig())
        .build()?;
    validate_helm_release(&helm_client, opts.release_name().as_str())?;

    if !opts.yes() {
        confirm(opts.namespace().as_str(), io::stdin().lock())?;
    }
    console_logger::info(
        format!(
            "Upgrading {PRODUCT} in namespace \"{}\".",
            opts.namespace()
        )
        .as_str(),
    );

    let upgrader = MeshUpgrader::builder()
        .with_namespace(opts.namespace())
        .with_kubeconfig(opts.kubeconfig())
        .with_release_name(opts.release_name())
        .with_chart_dir(opts.chart_dir())
        .with_image_tag(opts.image_tag())
        .with_timeout(opts.timeout())
        .with_dry_run(opts.dry_run())
        .with_skip_upgrade_path_validation(opts.skip_upgrade_path_validation())
        .build()?;
    info!(
        from = %upgrader.upgrade_from_version(),
        to = %upgrader.upgrade_to_version(),
        chart_dir = %upgrader.chart_dir().display(),
        "Validated upgrade"
    );

    console_logger::progress(
        format!(
            "Waiting up to {} for components to be ready...",
            humantime::format_duration(opts.timeout())
        )
        .as_str(),
    );

    let watcher = ImagePullWatcher::spawn(k8s_client.pods_api().clone(), IMAGE_PULL_CHECK_INTERVAL);
    let result = upgrader.run(&k8s_client).await;
    let result = with_image_pull_failure(result, watcher.shutdown().await);

    match result {
        Err(error) => {
            // Terminates the 'Waiting...' line.
            console_logger::newline();
            Err(error)
        }
        Ok(UpgradeOutcome::DryRun { manifest }) => {
            console_logger::newline();
            println!("{manifest}");
            Ok(())
        }
        Ok(UpgradeOutcome::Upgraded { crds }) => {
            for (name, action) in crds {
                info!(crd = %name, ?action, "Reconciled CustomResourceDefinition");
            }
            console_logger::done("done.");
            console_logger::info("Upgrade complete.");
            console_logger::info(SIDECAR_ROLLOUT_HINT);
            Ok(())
        }
    }
}
