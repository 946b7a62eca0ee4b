use crate::{
    common::{
        constants::CHART_NAME,
        error::{
            FindingHelmChart, GetNamespace, HelmVersion, HelmVersionCommand, NotADirectory,
            NotAFile, RegexCompile, Result, U8VectorToString, ValidateDirPath, ValidateFilePath,
        },
        kube_client::KubeClientSet,
    },
    helm::{
        chart::Chart,
        client::{run, stderr_of, HelmReleaseClient},
    },
    vec_to_strings,
};
use regex::bytes::Regex;
use snafu::{ensure, ResultExt};
use std::{
    fs,
    path::{Path, PathBuf},
    str,
};
use tracing::debug;

/// Validate that the helm release exists and is 'deployed' in the namespace.
pub(crate) fn validate_helm_release(client: &HelmReleaseClient, name: &str) -> Result<()> {
    let release = client.release_info(name)?;
    debug!(release = %release.name(), chart = %release.chart(), "Found installed helm release");

    Ok(())
}

/// Validate that the helm v3 binary is present in the shell's $PATH.
pub(crate) fn validate_helmv3_in_path() -> Result<()> {
    let command: &str = "helm";
    let args: Vec<String> = vec_to_strings!["version", "--short"];

    debug!(%command, ?args, "Helm version command");

    // Execute `helm version` to verify if the binary exists.
    let output = run(command, &args)?;

    let stdout_str = str::from_utf8(output.stdout.as_slice()).context(U8VectorToString)?;
    debug!(stdout=%stdout_str, "Helm version command standard output");
    ensure!(
        output.status.success(),
        HelmVersionCommand {
            command: command.to_string(),
            args,
            std_err: stderr_of(&output)?
        }
    );

    // Parse based on regex, to validate if the version string (semver) is v3.x.
    let regex: &str = r"^(v3\.[0-9]+\.[0-9])";
    ensure!(
        Regex::new(regex)
            .context(RegexCompile {
                expression: regex.to_string(),
            })?
            .is_match(output.stdout.as_slice()),
        HelmVersion {
            version: stdout_str.to_string(),
        }
    );

    Ok(())
}

/// Validate the input helm chart directory path:
/// - validate if the path exists.
/// - validate if the chart name in the Chart.yaml file is correct.
/// - validate if the expected helm chart files and directories are present.
pub(crate) fn validate_helm_chart_dir(dir_path: &Path) -> Result<()> {
    ensure!(
        path_exists_and_is_dir(dir_path.to_path_buf())?,
        NotADirectory { path: dir_path }
    );

    // Validate Chart.yaml file.
    let chart_yaml_path = dir_path.join("Chart.yaml");
    ensure!(
        path_exists_and_is_file(chart_yaml_path.clone())?,
        NotAFile {
            path: chart_yaml_path.clone()
        }
    );

    let chart = Chart::try_from(chart_yaml_path.as_path())?;
    ensure!(
        chart.name().eq(CHART_NAME),
        FindingHelmChart {
            path: dir_path,
            chart_name: chart.name()
        }
    );

    // Validate values.yaml file.
    let values_yaml_path = dir_path.join("values.yaml");
    ensure!(
        path_exists_and_is_file(values_yaml_path.clone())?,
        NotAFile {
            path: values_yaml_path
        }
    );

    // Validate templates directory.
    let templates_dir_path = dir_path.join("templates");
    ensure!(
        path_exists_and_is_dir(templates_dir_path.clone())?,
        NotADirectory {
            path: templates_dir_path
        }
    );

    Ok(())
}

fn path_exists_and_is_dir(path: PathBuf) -> Result<bool> {
    fs::metadata(path.as_path())
        .map(|m| m.is_dir())
        .context(ValidateDirPath { path })
}

fn path_exists_and_is_file(path: PathBuf) -> Result<bool> {
    fs::metadata(path.as_path())
        .map(|m| m.is_file())
        .context(ValidateFilePath { path })
}

/// This checks for 2 things:
/// - if the kubernetes API is reachable.
/// - if the input namespace exists.
pub(crate) async fn validate_namespace(k8s_client: &KubeClientSet) -> Result<()> {
    k8s_client
        .namespaces_api()
        .get(k8s_client.namespace())
        .await
        .context(GetNamespace {
            namespace: k8s_client.namespace(),
        })?;

    Ok(())
}
