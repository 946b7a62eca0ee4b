use std::time::Duration;

/// This is the name of the project that is being upgraded.
pub(crate) const PRODUCT: &str = "NGINX Service Mesh";

/// This is the name of the Helm chart of this project.
pub(crate) const CHART_NAME: &str = "nginx-service-mesh";

/// This is the default release name of the installed Helm chart.
pub(crate) const DEFAULT_RELEASE_NAME: &str = "nginx-service-mesh";

/// This is the default Kubernetes Namespace of the control plane.
pub(crate) const DEFAULT_NAMESPACE: &str = "nginx-mesh";

/// This is the default time to wait for the upgraded components to become ready.
pub(crate) const DEFAULT_UPGRADE_TIMEOUT: &str = "5m";

/// This is the name of the ConfigMap which holds the run-time mesh configuration.
pub(crate) const MESH_CONFIG_MAP: &str = "mesh-config";

/// This is the key of the mesh configuration document in the mesh-config ConfigMap.
pub(crate) const MESH_CONFIG_FILE_NAME: &str = "mesh-config.json";

/// Chart files whose names start with this prefix are CustomResourceDefinition manifests.
pub(crate) const CRDS_DIR_PREFIX: &str = "crds/";

/// This is the value of the 'environment' helm value for OpenShift installations.
pub(crate) const OPENSHIFT_ENVIRONMENT: &str = "openshift";

/// This is the user docs URL for upgrading OpenShift installations by hand.
pub(crate) const OPENSHIFT_UPGRADE_DOCS_URL: &str =
    "https://docs.nginx.com/nginx-service-mesh/guides/upgrade/#upgrade-to-170-in-openshift";

/// This is the interval between two consecutive checks for image pull failures.
pub(crate) const IMAGE_PULL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// These are the container waiting reasons which indicate that an image could not be pulled.
pub(crate) const IMAGE_PULL_FAILURE_REASONS: [&str; 2] = ["ErrImagePull", "ImagePullBackOff"];

/// This is the tracing-subscriber filter used when RUST_LOG is not set.
pub(crate) const DEFAULT_TRACING_FILTER: &str = "warn";

/// Hint printed once the control plane has been upgraded.
pub(crate) const SIDECAR_ROLLOUT_HINT: &str =
    "To upgrade sidecars, re-roll resources using 'kubectl rollout restart <resource>/<name>'.";
