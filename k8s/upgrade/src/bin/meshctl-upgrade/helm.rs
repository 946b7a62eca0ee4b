/// Contains the HelmReleaseClient. Used for interacting with installed helm chart releases.
pub(crate) mod client;

/// Contains helm chart upgrade logic.
pub(crate) mod upgrade;

/// Contains the typed helm values and the logic to merge them for the `helm upgrade` command.
pub(crate) mod values;

/// Contains the tools to load a helm chart's files from the local filesystem.
pub(crate) mod chart;
