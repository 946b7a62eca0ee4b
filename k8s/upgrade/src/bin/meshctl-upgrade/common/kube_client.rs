use crate::common::error::{
    InferKubeConfig, K8sClientGeneration, KubeClientSetBuilderNs, LoadKubeconfig, ReadKubeconfig,
    Result,
};
use k8s_openapi::{
    api::core::v1::{ConfigMap, Namespace, Pod},
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
};
use kube::{
    api::Api,
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use snafu::ResultExt;
use std::path::PathBuf;

/// Builder for Kubernetes clients.
#[derive(Default)]
pub(crate) struct KubeClientSetBuilder {
    namespace: Option<String>,
    kubeconfig: Option<PathBuf>,
}

impl KubeClientSetBuilder {
    /// Build Kubernetes API clients for a specific namespace (for namespaced object only).
    #[must_use]
    pub(crate) fn with_namespace<T>(mut self, namespace: T) -> Self
    where
        T: ToString,
    {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Use this kubeconfig file instead of inferring the client configuration.
    #[must_use]
    pub(crate) fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    /// Build the KubeClientSet.
    pub(crate) async fn build(self) -> Result<KubeClientSet> {
        // Namespace must be used.
        let namespace = self.namespace.ok_or(KubeClientSetBuilderNs.build())?;

        let config = match self.kubeconfig {
            Some(path) => {
                let kubeconfig =
                    Kubeconfig::read_from(path.as_path()).context(ReadKubeconfig {
                        path: path.clone(),
                    })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .context(LoadKubeconfig { path })?
            }
            None => Config::infer().await.context(InferKubeConfig)?,
        };

        let client = Client::try_from(config).context(K8sClientGeneration)?;
        Ok(KubeClientSet {
            pods_api: Api::namespaced(client.clone(), namespace.as_str()),
            configmaps_api: Api::namespaced(client.clone(), namespace.as_str()),
            namespaces_api: Api::all(client.clone()),
            crd_api: Api::all(client),
            namespace,
        })
    }
}

/// This is a wrapper around kube::Client with the Api<?> clients used during upgrade.
pub(crate) struct KubeClientSet {
    namespace: String,
    pods_api: Api<Pod>,
    configmaps_api: Api<ConfigMap>,
    namespaces_api: Api<Namespace>,
    crd_api: Api<CustomResourceDefinition>,
}

impl KubeClientSet {
    pub(crate) fn builder() -> KubeClientSetBuilder {
        KubeClientSetBuilder::default()
    }

    /// The namespace the namespaced Api clients are scoped to.
    pub(crate) fn namespace(&self) -> &str {
        self.namespace.as_str()
    }

    /// Get the Pod api client.
    pub(crate) fn pods_api(&self) -> &Api<Pod> {
        &self.pods_api
    }

    /// Get the ConfigMap api client.
    pub(crate) fn configmaps_api(&self) -> &Api<ConfigMap> {
        &self.configmaps_api
    }

    /// Get the Namespace api client.
    pub(crate) fn namespaces_api(&self) -> &Api<Namespace> {
        &self.namespaces_api
    }

    /// Get the CustomResourceDefinition api client.
    pub(crate) fn crd_api(&self) -> &Api<CustomResourceDefinition> {
        &self.crd_api
    }
}
