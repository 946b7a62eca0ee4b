use crate::common::constants::{CHART_NAME, OPENSHIFT_UPGRADE_DOCS_URL, PRODUCT};
use snafu::Snafu;
use std::path::PathBuf;

/// For use with multiple fallible operations which may fail for different reasons, but are
/// defined withing the same scope and must return to the outer scope (calling scope) using
/// the try operator -- '?'.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(context(suffix(false)))]
pub(crate) enum Error {
    /// Error for use when parsing invalid tracing-subscriber filter directive.
    #[snafu(display(
        "Failed to create tracing-subscriber filter with directive {}: {}",
        filter,
        source
    ))]
    TracingSubscriberFilter {
        source: tracing_subscriber::filter::ParseError,
        filter: String,
    },

    /// Error for when the kubeconfig file could not be read.
    #[snafu(display("Failed to read kubeconfig file {}: {}", path.display(), source))]
    ReadKubeconfig {
        source: kube::config::KubeconfigError,
        path: PathBuf,
    },

    /// Error for when a client configuration could not be generated from a kubeconfig file.
    #[snafu(display(
        "Failed to load client configuration from kubeconfig {}: {}",
        path.display(),
        source
    ))]
    LoadKubeconfig {
        source: kube::config::KubeconfigError,
        path: PathBuf,
    },

    /// Error for when the client configuration could not be inferred from the environment.
    #[snafu(display("Failed to infer kubernetes client configuration: {}", source))]
    InferKubeConfig {
        source: kube::config::InferConfigError,
    },

    /// Error for when Kubernetes API client generation fails.
    #[snafu(display("Failed to generate kubernetes client: {}", source))]
    K8sClientGeneration { source: kube::Error },

    /// Error for when namespace option is not set when building KubeClientSet.
    #[snafu(display("Mandatory KubeClientSetBuilder option 'namespace' not set"))]
    KubeClientSetBuilderNs,

    /// Error for a Kubernetes API GET request for a namespace resource fails.
    #[snafu(display("Failed to GET Kubernetes namespace {}: {}", namespace, source))]
    GetNamespace {
        source: kube::Error,
        namespace: String,
    },

    /// Error for when a Helm command fails.
    #[snafu(display(
        "Failed to run Helm command,\ncommand: {},\nargs: {:?},\ncommand_error: {}",
        command,
        args,
        source
    ))]
    HelmCommand {
        source: std::io::Error,
        command: String,
        args: Vec<String>,
    },

    /// Error for when Helm v3.x.y is not present in $PATH.
    #[snafu(display("Helm version {} does not start with 'v3.x.y'", version))]
    HelmVersion { version: String },

    /// Error for when a Helm version command execution succeeds, but with an error.
    #[snafu(display(
        "`helm version` command return an error,\ncommand: {},\nargs: {:?},\nstd_err: {}",
        command,
        args,
        std_err,
    ))]
    HelmVersionCommand {
        command: String,
        args: Vec<String>,
        std_err: String,
    },

    /// Error for when a Helm list command execution succeeds, but with an error.
    #[snafu(display(
        "`helm list` command return an error,\ncommand: {},\nargs: {:?},\nstd_err: {}",
        command,
        args,
        std_err,
    ))]
    HelmListCommand {
        command: String,
        args: Vec<String>,
        std_err: String,
    },

    /// Error for when a Helm get values command execution succeeds, but with an error.
    #[snafu(display(
        "`helm get values` command return an error,\ncommand: {},\nargs: {:?},\nstd_err: {}",
        command,
        args,
        std_err,
    ))]
    HelmGetValuesCommand {
        command: String,
        args: Vec<String>,
        std_err: String,
    },

    /// Error for when a Helm upgrade command execution succeeds, but with an error.
    #[snafu(display(
        "`helm upgrade` command return an error,\ncommand: {},\nargs: {:?},\nstd_err: {}",
        command,
        args,
        std_err,
    ))]
    HelmUpgradeCommand {
        command: String,
        args: Vec<String>,
        std_err: String,
    },

    /// Error for when input Helm release is not found in the input namespace.
    #[snafu(display(
        "'deployed' Helm release {} not found in Namespace {}, is {} installed?",
        name,
        namespace,
        PRODUCT
    ))]
    HelmRelease { name: String, namespace: String },

    /// Error for mandatory options for a HelmReleaseClient are missing when building.
    #[snafu(display("Setting namespace is mandatory for HelmReleaseClient"))]
    HelmClientNs,

    /// Error for mandatory options for a MeshUpgrader are missing when building.
    #[snafu(display("Mandatory options for MeshUpgrader were not given"))]
    UpgraderOptionsAbsent,

    /// Error for use when converting Vec<> to String.
    #[snafu(display("Failed to convert Vec<u8> to UTF-8 formatted String: {}", source))]
    U8VectorToString { source: std::str::Utf8Error },

    /// Error for when regular expression parsing or compilation fails.
    #[snafu(display("Failed to compile regex {}: {}", expression, source))]
    RegexCompile {
        source: regex::Error,
        expression: String,
    },

    /// Error for when yaml could not be parsed from a slice.
    #[snafu(display("Failed to parse YAML {}: {}", input_yaml, source))]
    YamlParseFromSlice {
        source: serde_yaml::Error,
        input_yaml: String,
    },

    /// Error for when yaml could not be parsed from a file.
    #[snafu(display("Failed to parse YAML at {}: {}", filepath.display(), source))]
    YamlParseFromFile {
        source: serde_yaml::Error,
        filepath: PathBuf,
    },

    /// Error for when the merged helm values could not be serialized.
    #[snafu(display("Failed to serialize helm values to YAML: {}", source))]
    SerializeValues { source: serde_yaml::Error },

    /// Error for when the path to a directory cannot be validated.
    #[snafu(display("Failed to validate directory path {}: {}", path.display(), source))]
    ValidateDirPath {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Error for when the path to a file cannot be validated.
    #[snafu(display("Failed to validate filepath {}: {}", path.display(), source))]
    ValidateFilePath {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Error for when the path is not that of a directory.
    #[snafu(display("{} is not a directory", path.display()))]
    NotADirectory { path: PathBuf },

    /// Error for when the path is not that of a file.
    #[snafu(display("{} is not a file", path.display()))]
    NotAFile { path: PathBuf },

    /// Error for when the helm chart found in a path is not the mesh chart.
    #[snafu(display(
        "Helm chart in path {} is '{}', expected '{}'",
        path.display(),
        chart_name,
        CHART_NAME
    ))]
    FindingHelmChart { path: PathBuf, chart_name: String },

    /// Error for when reading the contents of a file fails.
    #[snafu(display("Failed to read file {}: {}", filepath.display(), source))]
    ReadingFile {
        source: std::io::Error,
        filepath: PathBuf,
    },

    /// Error for when listing the entries of a directory fails.
    #[snafu(display("Failed to read directory {}: {}", path.display(), source))]
    ReadingDirectoryContents {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Error for when a chart file path cannot be expressed relative to the chart directory.
    #[snafu(display(
        "File {} is not inside the chart directory {}",
        filepath.display(),
        chart_dir.display()
    ))]
    ChartFileOutsideChart {
        filepath: PathBuf,
        chart_dir: PathBuf,
    },

    /// Error for when a temporary file could not be created.
    #[snafu(display("Failed to create temporary file: {}", source))]
    TempFileCreation { source: std::io::Error },

    /// Error for when writing to a temporary file fails.
    #[snafu(display("Failed to write to temporary file {}: {}", filepath.display(), source))]
    WriteToTempFile {
        source: std::io::Error,
        filepath: PathBuf,
    },

    /// Error for when the run-time mesh configuration ConfigMap could not be fetched.
    #[snafu(display(
        "Failed to GET previous mesh configuration ConfigMap {} in namespace {}: {}",
        name,
        namespace,
        source
    ))]
    GetMeshConfigMap {
        source: kube::Error,
        name: String,
        namespace: String,
    },

    /// Error for when the mesh configuration document is missing from its ConfigMap.
    #[snafu(display(
        "ConfigMap {} in namespace {} has no '{}' entry",
        name,
        namespace,
        key
    ))]
    MeshConfigAbsent {
        name: String,
        namespace: String,
        key: String,
    },

    /// Error for when the previous mesh configuration is not valid JSON.
    #[snafu(display("Failed to unmarshal previous mesh configuration from {}: {}", name, source))]
    MeshConfigParse {
        source: serde_json::Error,
        name: String,
    },

    /// Error for when the previous deployment's environment cannot be upgraded by this tool.
    #[snafu(display(
        "Upgrade command is not supported for environment '{}'.\nSee {} for more information on how to upgrade",
        environment,
        OPENSHIFT_UPGRADE_DOCS_URL
    ))]
    UnsupportedEnvironment { environment: String },

    /// Error for failures in generating semver::Value from a &str input.
    #[snafu(display("Failed to parse {} as a valid semver: {}", version_string, source))]
    SemverParse {
        source: semver::Error,
        version_string: String,
    },

    /// Error for when the chart of the installed release is not the mesh chart.
    #[snafu(display(
        "'{}' is not a known {} helm chart, only the '{}' chart is supported",
        chart,
        PRODUCT,
        CHART_NAME
    ))]
    NotAKnownHelmChart { chart: String },

    /// Error for when the upgrade goes to an older version.
    #[snafu(display(
        "Failed to upgrade from {} to {}: upgrade to an earlier-released version is forbidden",
        from_version,
        to_version
    ))]
    RollbackForbidden {
        from_version: String,
        to_version: String,
    },

    /// Error for when a chart file under crds/ does not contain a valid
    /// CustomResourceDefinition.
    #[snafu(display("Could not unmarshal CRD '{}': {}", filename, source))]
    ParseCrd {
        source: serde_yaml::Error,
        filename: String,
    },

    /// Error for when GET-ing the current state of a CustomResourceDefinition fails.
    #[snafu(display("Error getting current CRD '{}': {}", name, source))]
    GetCrd { source: kube::Error, name: String },

    /// Error for when creating a CustomResourceDefinition fails.
    #[snafu(display("Error creating CRD '{}': {}", name, source))]
    CreateCrd { source: kube::Error, name: String },

    /// Error for when updating a CustomResourceDefinition fails.
    #[snafu(display("Error updating CRD '{}': {}", name, source))]
    UpdateCrd { source: kube::Error, name: String },

    /// Error for when the upgrade fails after Pods were seen failing to pull their images.
    #[snafu(display(
        "{}\nPods failed to pull their images during the upgrade: {}",
        source,
        failure
    ))]
    UpgradeWithImagePullFailure { source: Box<Error>, failure: String },

    /// Error for when the user's answer could not be read.
    #[snafu(display("Failed to read user input: {}", source))]
    ReadUserInput { source: std::io::Error },

    /// Error for when the user declines the upgrade.
    #[snafu(display("Upgrade aborted"))]
    UpgradeAborted,
}

/// A wrapper type to remove repeated Result<T, Error> returns.
pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;
