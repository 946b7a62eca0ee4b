use crate::{
    common::error::{CreateCrd, GetCrd, ParseCrd, Result, UpdateCrd},
    helm::chart::ChartFile,
};
use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition as Crd;
use kube::{
    api::{Api, PostParams},
    ResourceExt,
};
use serde::Deserialize;
use serde_yaml::Value;
use snafu::ResultExt;
use tracing::info;

/// The CustomResourceDefinition operations which the reconciliation needs from the cluster.
#[async_trait]
pub(crate) trait CrdStore: Send + Sync {
    /// Returns None if the CRD does not exist.
    async fn get(&self, name: &str) -> Result<Option<Crd>, kube::Error>;
    async fn create(&self, crd: &Crd) -> Result<(), kube::Error>;
    /// The CRD must carry the resourceVersion of the object it replaces.
    async fn replace(&self, crd: &Crd) -> Result<(), kube::Error>;
}

#[async_trait]
impl CrdStore for Api<Crd> {
    async fn get(&self, name: &str) -> Result<Option<Crd>, kube::Error> {
        self.get_opt(name).await
    }

    async fn create(&self, crd: &Crd) -> Result<(), kube::Error> {
        Api::create(self, &PostParams::default(), crd)
            .await
            .map(|_| ())
    }

    async fn replace(&self, crd: &Crd) -> Result<(), kube::Error> {
        Api::replace(self, crd.name_any().as_str(), &PostParams::default(), crd)
            .await
            .map(|_| ())
    }
}

/// What the reconciliation did to a CustomResourceDefinition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CrdAction {
    Created,
    Updated,
}

/// Parses every CustomResourceDefinition document in a chart file. Empty documents are skipped.
pub(crate) fn parse_crds(file: &ChartFile) -> Result<Vec<Crd>> {
    let mut crds = Vec::new();

    for document in serde_yaml::Deserializer::from_slice(file.data()) {
        let value = Value::deserialize(document).context(ParseCrd {
            filename: file.name(),
        })?;
        if value.is_null() {
            continue;
        }

        let crd: Crd = serde_yaml::from_value(value).context(ParseCrd {
            filename: file.name(),
        })?;
        crds.push(crd);
    }

    Ok(crds)
}

/// Creates the CustomResourceDefinitions which don't exist in the cluster, and updates the ones
/// which do. This converges: running it again only updates.
pub(crate) async fn reconcile_crds<'a, S, I>(store: &S, files: I) -> Result<Vec<(String, CrdAction)>>
where
    S: CrdStore + ?Sized,
    I: IntoIterator<Item = &'a ChartFile>,
{
    let mut actions = Vec::new();

    for file in files {
        for mut crd in parse_crds(file)? {
            let name = crd.name_any();

            // An update requires the current resourceVersion.
            let current = store.get(name.as_str()).await.context(GetCrd {
                name: name.clone(),
            })?;

            let action = match current {
                None => {
                    store.create(&crd).await.context(CreateCrd {
                        name: name.clone(),
                    })?;
                    info!(crd = %name, "Created CustomResourceDefinition");
                    CrdAction::Created
                }
                Some(current) => {
                    crd.metadata.resource_version = current.resource_version();
                    store.replace(&crd).await.context(UpdateCrd {
                        name: name.clone(),
                    })?;
                    info!(crd = %name, "Updated CustomResourceDefinition");
                    CrdAction::Updated
                }
            };

            actions.push((name, action));
        }
    }

    Ok(actions)
}
