use crate::common::{
    constants::IMAGE_PULL_FAILURE_REASONS,
    error::{Result, UpgradeWithImagePullFailure},
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use kube::{
    api::{Api, ListParams},
    ResourceExt,
};
use snafu::ResultExt;
use std::{fmt, time::Duration};
use tokio::{
    select,
    sync::oneshot,
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, error, warn};

/// Lists the Pods which are checked for image pull failures.
#[async_trait]
pub(crate) trait PodLister: Send + Sync + 'static {
    async fn list_pods(&self) -> Result<Vec<Pod>, kube::Error>;
}

#[async_trait]
impl PodLister for Api<Pod> {
    async fn list_pods(&self) -> Result<Vec<Pod>, kube::Error> {
        Ok(self.list(&ListParams::default()).await?.items)
    }
}

/// A container which is waiting because its image could not be pulled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ImagePullFailure {
    pub(crate) pod: String,
    pub(crate) container: String,
    pub(crate) image: String,
    pub(crate) reason: String,
    pub(crate) message: String,
}

impl fmt::Display for ImagePullFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pod '{}', container '{}': {} for image '{}': {}",
            self.pod, self.container, self.reason, self.image, self.message
        )
    }
}

/// Returns the first container, init containers included, which is waiting on an image pull.
pub(crate) fn find_image_pull_failure(pods: &[Pod]) -> Option<ImagePullFailure> {
    pods.iter().find_map(|pod| {
        let status = pod.status.as_ref()?;
        status
            .init_container_statuses
            .iter()
            .chain(status.container_statuses.iter())
            .flatten()
            .find_map(|container| image_pull_failure(pod.name_any(), container))
    })
}

fn image_pull_failure(pod: String, container: &ContainerStatus) -> Option<ImagePullFailure> {
    let waiting = container.state.as_ref()?.waiting.as_ref()?;
    let reason = waiting.reason.as_deref()?;

    IMAGE_PULL_FAILURE_REASONS
        .contains(&reason)
        .then(|| ImagePullFailure {
            pod,
            container: container.name.clone(),
            image: container.image.clone(),
            reason: reason.to_string(),
            message: waiting.message.clone().unwrap_or_default(),
        })
}

/// A background task which polls the Pods in the mesh namespace while the upgrade runs, and
/// reports the first image pull failure. It does not interrupt the upgrade.
pub(crate) struct ImagePullWatcher {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Option<ImagePullFailure>>,
}

impl ImagePullWatcher {
    /// Starts polling with the given interval.
    pub(crate) fn spawn<L>(lister: L, interval: Duration) -> Self
    where
        L: PodLister,
    {
        let (tx, mut rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                match lister.list_pods().await {
                    Ok(pods) => {
                        if let Some(failure) = find_image_pull_failure(&pods) {
                            error!(%failure, "Image pull failure");
                            console_logger::newline();
                            console_logger::warn(
                                "Failed to pull an image, the upgrade will not complete:",
                                failure.to_string().as_str(),
                            );
                            return Some(failure);
                        }
                    }
                    Err(error) => warn!(%error, "Failed to list Pods, retrying"),
                }

                // Exits when the sender is used or dropped.
                select! {
                    _ = &mut rx => {
                        debug!("Image pull watcher stopped");
                        return None;
                    }
                    _ = sleep(interval) => {}
                }
            }
        });

        Self {
            shutdown: Some(tx),
            handle,
        }
    }

    /// Stops the polling task and returns the failure it reported, if any.
    pub(crate) async fn shutdown(mut self) -> Option<ImagePullFailure> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        self.handle.await.unwrap_or_else(|error| {
            error!(%error, "Image pull watcher task failed");
            None
        })
    }
}

/// Adds the image pull failure seen by the watcher, if any, to a failed upgrade's error.
pub(crate) fn with_image_pull_failure<T>(
    result: Result<T>,
    failure: Option<ImagePullFailure>,
) -> Result<T> {
    match (result, failure) {
        (Err(error), Some(failure)) => {
            error!(%failure, "Upgrade failed after an image pull failure");
            Err(Box::new(error)).context(UpgradeWithImagePullFailure {
                failure: failure.to_string(),
            })
        }
        (result, _) => result,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        find_image_pull_failure, with_image_pull_failure, ImagePullFailure, ImagePullWatcher,
        PodLister,
    };
    use crate::common::error::Error;
    use async_trait::async_trait;
    use k8s_openapi::{
        api::core::v1::{
            ContainerState, ContainerStateRunning, ContainerStateWaiting, ContainerStatus, Pod,
            PodStatus,
        },
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };
    use kube::core::ErrorResponse;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    fn waiting(name: &str, reason: &str) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            image: format!("docker-registry.nginx.com/nsm/{name}:1.7.0"),
            state: Some(ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some(reason.to_string()),
                    message: Some("manifest unknown".to_string()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn running(name: &str) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            state: Some(ContainerState {
                running: Some(ContainerStateRunning::default()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pod(name: &str, init: Vec<ContainerStatus>, containers: Vec<ContainerStatus>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                init_container_statuses: Some(init),
                container_statuses: Some(containers),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn healthy_pods_have_no_failure() {
        let pods = vec![
            pod("nats-server", vec![], vec![running("nats-server")]),
            pod(
                "nginx-mesh-api",
                vec![],
                vec![waiting("nginx-mesh-api", "ContainerCreating")],
            ),
            Pod::default(),
        ];

        assert_eq!(find_image_pull_failure(&pods), None);
    }

    #[test]
    fn waiting_container_is_found() {
        let pods = vec![
            pod("nats-server", vec![], vec![running("nats-server")]),
            pod(
                "spire-server",
                vec![],
                vec![running("spire-server"), waiting("spire-agent", "ErrImagePull")],
            ),
        ];

        let failure = find_image_pull_failure(&pods).unwrap();
        assert_eq!(failure.pod, "spire-server");
        assert_eq!(failure.container, "spire-agent");
        assert_eq!(failure.reason, "ErrImagePull");
        assert_eq!(failure.message, "manifest unknown");
    }

    #[test]
    fn init_containers_are_checked() {
        let pods = vec![pod(
            "nginx-mesh-controller",
            vec![waiting("init", "ImagePullBackOff")],
            vec![],
        )];

        let failure = find_image_pull_failure(&pods).unwrap();
        assert_eq!(failure.container, "init");
        assert_eq!(failure.reason, "ImagePullBackOff");
    }

    struct FakePodLister {
        pods: Vec<Pod>,
        calls: Arc<AtomicUsize>,
        fail_first: bool,
    }

    #[async_trait]
    impl PodLister for FakePodLister {
        async fn list_pods(&self) -> Result<Vec<Pod>, kube::Error> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(kube::Error::Api(ErrorResponse {
                    status: "Failure".to_string(),
                    message: "etcdserver: request timed out".to_string(),
                    reason: "Timeout".to_string(),
                    code: 504,
                }));
            }
            Ok(self.pods.clone())
        }
    }

    #[tokio::test]
    async fn watcher_reports_failure_after_list_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lister = FakePodLister {
            pods: vec![pod(
                "nginx-mesh-api",
                vec![],
                vec![waiting("nginx-mesh-api", "ErrImagePull")],
            )],
            calls: calls.clone(),
            fail_first: true,
        };

        let watcher = ImagePullWatcher::spawn(lister, Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let failure = watcher.shutdown().await.unwrap();
        assert_eq!(failure.pod, "nginx-mesh-api");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn watcher_stops_on_shutdown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lister = FakePodLister {
            pods: vec![pod("nats-server", vec![], vec![running("nats-server")])],
            calls: calls.clone(),
            fail_first: false,
        };

        let watcher = ImagePullWatcher::spawn(lister, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(watcher.shutdown().await, None);
        let polls = calls.load(Ordering::SeqCst);
        assert!(polls >= 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), polls);
    }

    fn pull_failure() -> ImagePullFailure {
        ImagePullFailure {
            pod: "nginx-mesh-api".to_string(),
            container: "nginx-mesh-api".to_string(),
            image: "docker-registry.nginx.com/nsm/nginx-mesh-api:1.7.0".to_string(),
            reason: "ImagePullBackOff".to_string(),
            message: "manifest unknown".to_string(),
        }
    }

    #[test]
    fn failed_upgrade_error_names_the_image_pull_failure() {
        let result: Result<(), Error> = with_image_pull_failure(
            Err(Error::HelmUpgradeCommand {
                command: "helm".to_string(),
                args: vec![],
                std_err: "timed out waiting for the condition".to_string(),
            }),
            Some(pull_failure()),
        );

        let error = result.unwrap_err();
        assert!(matches!(error, Error::UpgradeWithImagePullFailure { .. }));
        let message = error.to_string();
        assert!(message.contains("timed out waiting for the condition"));
        assert!(message.contains("nginx-mesh-api:1.7.0"));
        assert!(message.contains("ImagePullBackOff"));
    }

    #[test]
    fn outcome_is_kept_otherwise() {
        assert_eq!(with_image_pull_failure(Ok(7), Some(pull_failure())).unwrap(), 7);
        assert!(matches!(
            with_image_pull_failure::<()>(Err(Error::UpgradeAborted), None),
            Err(Error::UpgradeAborted)
        ));
    }
}
