//! # Meshgate Docker
//!
//! A [`ContainerRuntime`] backed by the local Docker daemon.
//!
//! ## Usage
//!
//! ```no_run
//! use meshgate_docker::DockerRuntime;
//!
//! # async fn run() -> Result<(), meshgate_core::error::ComputeError> {
//! let runtime = DockerRuntime::connect_local()?;
//! # Ok(())
//! # }
//! ```

use meshgate_core::prelude::*;

use bollard::config::ContainerCreateBody;
use bollard::container::LogOutput as DockerLogOutput;
use bollard::errors::Error as DockerError;
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, BuildImageOptionsBuilder, CreateContainerOptions,
    EventsOptions, RemoveContainerOptionsBuilder, WaitContainerOptionsBuilder,
};
use bollard::{
    Docker,
    models::{DeviceRequest, EventMessage, HostConfig},
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::HashMap;
use std::path::Path;
use std::task::Poll;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connects to the local Docker socket (defaults to /var/run/docker.sock on Linux)
    pub fn connect_local() -> Result<Self, ComputeError> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| ComputeError::System(format!("Failed to connect to Docker: {}", e)))?;
        Ok(Self { client })
    }

    pub fn new(client: Docker) -> Self {
        Self { client }
    }
}

/// Packs `dir` into an uncompressed tarball, the form the build endpoint expects.
fn pack_context(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.append_dir_all(".", dir)?;
    archive.into_inner()
}

fn device_requests(gpu: &GpuRequest) -> Vec<DeviceRequest> {
    vec![DeviceRequest {
        driver: gpu.driver.clone(),
        count: Some(gpu.count),
        capabilities: Some(vec![gpu.capabilities.clone()]),
        ..Default::default()
    }]
}

fn create_body(plan: RunPlan) -> ContainerCreateBody {
    let binds: Vec<String> = plan.bindings.iter().map(VolumeBinding::to_bind_spec).collect();
    let env = plan.env_list();

    ContainerCreateBody {
        image: Some(plan.tag),
        cmd: Some(plan.args),
        env: Some(env),
        host_config: Some(HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            device_requests: plan.device_requests.as_ref().map(device_requests),
            auto_remove: Some(plan.auto_remove),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn launch_error(tag: &str, err: DockerError) -> ComputeError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => ComputeError::ImageNotFound(tag.to_string()),
        e => ComputeError::Launch(e.to_string()),
    }
}

fn to_event(output: DockerLogOutput) -> RunEvent {
    let (source, chunk): (LogSource, Bytes) = match output {
        DockerLogOutput::StdOut { message } => (LogSource::Stdout, message),
        DockerLogOutput::StdErr { message } => (LogSource::Stderr, message),
        DockerLogOutput::Console { message } => (LogSource::Console, message),
        DockerLogOutput::StdIn { message } => (LogSource::Console, message),
    };
    RunEvent::Output { source, chunk }
}

type WaitResult = Option<Result<bollard::models::ContainerWaitResponse, DockerError>>;

#[derive(Debug, PartialEq)]
enum WaitStatus {
    Exited(i64),
    /// The container was removed before the wait reached the daemon.
    Removed,
    Failed(ComputeError),
}

fn wait_status(res: Result<WaitResult, oneshot::error::RecvError>) -> WaitStatus {
    match res {
        Ok(Some(Ok(resp))) => WaitStatus::Exited(resp.status_code),
        // bollard reports non-zero exit codes as errors
        Ok(Some(Err(DockerError::DockerContainerWaitError { code, .. }))) => {
            WaitStatus::Exited(code)
        }
        Ok(Some(Err(DockerError::DockerResponseServerError {
            status_code: 404, ..
        }))) => WaitStatus::Removed,
        Ok(Some(Err(e))) => WaitStatus::Failed(ComputeError::System(e.to_string())),
        Ok(None) | Err(_) => WaitStatus::Failed(ComputeError::System(
            "Wait stream ended without an exit status".to_string(),
        )),
    }
}

/// Exit code carried by a `die` event.
fn die_exit_code(msg: &EventMessage) -> Option<i64> {
    msg.actor
        .as_ref()?
        .attributes
        .as_ref()?
        .get("exitCode")?
        .parse()
        .ok()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Recovers the exit code of an already removed container from the daemon's event log.
async fn replay_exit(client: &Docker, name: &str, since: i64) -> Result<RunEvent, ComputeError> {
    let options = EventsOptions {
        since: Some(since.to_string()),
        until: Some((unix_now() + 1).to_string()),
        filters: Some(HashMap::from([
            ("container".to_string(), vec![name.to_string()]),
            ("event".to_string(), vec!["die".to_string()]),
        ])),
        ..Default::default()
    };

    let mut events = std::pin::pin!(client.events(Some(options)));
    while let Some(msg) = events
        .try_next()
        .await
        .map_err(|e| ComputeError::System(e.to_string()))?
    {
        if let Some(code) = die_exit_code(&msg) {
            return Ok(RunEvent::Exited(code));
        }
    }

    Err(ComputeError::System(format!(
        "Container {name} was removed before its exit status was read"
    )))
}

impl DockerRuntime {
    /// Removes a container that was created but never started, `auto_remove` only covers exits.
    async fn discard(&self, name: &str) {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();
        if let Err(e) = self.client.remove_container(name, Some(options)).await {
            warn!(container = %name, error = %e, "Failed to remove unstarted container");
        }
    }

    /// Sends the wait request and resolves once it has been issued.
    ///
    /// The returned receiver yields the final wait result.
    async fn arm_wait(&self, name: &str) -> oneshot::Receiver<WaitResult> {
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = oneshot::channel::<WaitResult>();
        let client = self.client.clone();
        let name = name.to_string();

        tokio::spawn(async move {
            let options = WaitContainerOptionsBuilder::default()
                .condition("removed")
                .build();
            let mut wait = std::pin::pin!(client.wait_container(name.as_str(), Some(options)));

            let res = match futures::poll!(wait.next()) {
                Poll::Ready(res) => {
                    let _ = armed_tx.send(());
                    res
                }
                Poll::Pending => {
                    let _ = armed_tx.send(());
                    wait.next().await
                }
            };
            let _ = exit_tx.send(res);
        });

        let _ = armed_rx.await;
        exit_rx
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn init(&self) -> Result<(), ComputeError> {
        self.client
            .version()
            .await
            .map_err(|e| ComputeError::System(format!("Docker unavailable: {}", e)))?;

        Ok(())
    }

    async fn build(&self, req: BuildRequest) -> Result<BuildOutput, ComputeError> {
        let context_dir = req.context_dir.clone();
        let context = tokio::task::spawn_blocking(move || pack_context(&context_dir))
            .await
            .map_err(|e| ComputeError::System(e.to_string()))?
            .map_err(|e| {
                ComputeError::Build(format!(
                    "Failed to read build context {}: {}",
                    req.context_dir.display(),
                    e
                ))
            })?;

        let options = BuildImageOptionsBuilder::default()
            .dockerfile(&req.build_file)
            .t(&req.tag)
            .rm(true)
            .build();

        let mut progress = std::pin::pin!(self.client.build_image(
            options,
            None,
            Some(bollard::body_full(Bytes::from(context)))
        ));

        let mut log = Vec::new();
        while let Some(info) = progress
            .try_next()
            .await
            .map_err(|e| ComputeError::Build(e.to_string()))?
        {
            if let Some(line) = info.stream.as_deref().map(str::trim_end)
                && !line.is_empty()
            {
                info!(tag = %req.tag, "{}", line);
                log.push(line.to_string());
            }
        }

        Ok(BuildOutput { tag: req.tag, log })
    }

    async fn run(&self, plan: RunPlan) -> Result<RunHandle, ComputeError> {
        let name = format!("meshgate-job-{}", uuid::Uuid::new_v4());
        let tag = plan.tag.clone();

        let options = CreateContainerOptions {
            name: name.clone().into(),
            ..Default::default()
        };

        self.client
            .create_container(Some(options), create_body(plan))
            .await
            .map_err(|e| launch_error(&tag, e))?;

        // Attach before starting so no early output is lost.
        let attach = AttachContainerOptionsBuilder::default()
            .stdout(true)
            .stderr(true)
            .stream(true)
            .logs(true)
            .build();
        let attached = match self.client.attach_container(name.as_str(), Some(attach)).await {
            Ok(attached) => attached,
            Err(e) => {
                self.discard(&name).await;
                return Err(ComputeError::Launch(format!("Failed to attach: {}", e)));
            }
        };

        // Register the wait before starting, the container is gone right after exit.
        let exit_rx = self.arm_wait(&name).await;
        let since = unix_now() - 1;

        if let Err(e) = self.client.start_container(name.as_str(), None).await {
            self.discard(&name).await;
            return Err(launch_error(&tag, e));
        }

        info!(container = %name, tag = %tag, "Container started");

        let output = attached.output.map(|res| {
            res.map(to_event)
                .map_err(|e| ComputeError::System(e.to_string()))
        });
        let client = self.client.clone();
        let wait_name = name.clone();
        let exit = stream::once(async move {
            let event = match wait_status(exit_rx.await) {
                WaitStatus::Exited(code) => Ok(RunEvent::Exited(code)),
                WaitStatus::Removed => {
                    debug!(container = %wait_name, "Container removed before wait, replaying events");
                    replay_exit(&client, &wait_name, since).await
                }
                WaitStatus::Failed(e) => Err(e),
            };
            debug!(?event, "Container wait finished");
            event
        });

        Ok(RunHandle {
            id: name,
            events: output.chain(exit).boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn gpu_plan() -> RunPlan {
        RunPlan {
            tag: "photogrammetry-gpu".into(),
            args: vec!["/app/input".into(), "/app/output".into()],
            env: vec![("AWS_REGION".into(), "eu-west-1".into())],
            bindings: VariantProfile::gpu("/srv").volume_bindings,
            device_requests: Some(GpuRequest::all_devices()),
            auto_remove: true,
        }
    }

    #[test]
    fn gpu_plan_maps_to_host_config() {
        let body = create_body(gpu_plan());
        let host = body.host_config.unwrap();

        assert_eq!(body.image.as_deref(), Some("photogrammetry-gpu"));
        assert_eq!(body.env, Some(vec!["AWS_REGION=eu-west-1".to_string()]));
        assert_eq!(host.auto_remove, Some(true));
        assert_eq!(
            host.binds,
            Some(vec![
                "/srv/input:/app/input:ro".to_string(),
                "/srv/output:/app/output:rw".to_string(),
            ])
        );

        let devices = host.device_requests.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].count, Some(-1));
        assert_eq!(
            devices[0].capabilities,
            Some(vec![vec!["gpu".to_string()]])
        );
    }

    #[test]
    fn cpu_plan_has_no_devices_or_binds() {
        let plan = RunPlan {
            tag: "photogrammetry-cpu".into(),
            bindings: Vec::new(),
            device_requests: None,
            ..gpu_plan()
        };
        let host = create_body(plan).host_config.unwrap();

        assert_eq!(host.binds, None);
        assert!(host.device_requests.is_none());
        assert_eq!(host.auto_remove, Some(true));
    }

    #[test]
    fn missing_image_is_distinguished() {
        let err = DockerError::DockerResponseServerError {
            status_code: 404,
            message: "No such image: photogrammetry-gpu:latest".into(),
        };
        assert_eq!(
            launch_error("photogrammetry-gpu", err),
            ComputeError::ImageNotFound("photogrammetry-gpu".into())
        );

        let err = DockerError::DockerResponseServerError {
            status_code: 500,
            message: "could not select device driver".into(),
        };
        assert!(matches!(
            launch_error("photogrammetry-gpu", err),
            ComputeError::Launch(_)
        ));
    }

    #[test]
    fn non_zero_wait_error_is_an_exit() {
        let res = Ok(Some(Err(DockerError::DockerContainerWaitError {
            error: String::new(),
            code: 3,
        })));
        assert_eq!(wait_status(res), WaitStatus::Exited(3));
        assert!(matches!(wait_status(Ok(None)), WaitStatus::Failed(_)));
    }

    #[test]
    fn wait_on_removed_container_is_not_a_failure() {
        let res = Ok(Some(Err(DockerError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: meshgate-job-1".into(),
        })));
        assert_eq!(wait_status(res), WaitStatus::Removed);

        let res = Ok(Some(Err(DockerError::DockerResponseServerError {
            status_code: 500,
            message: "daemon shutting down".into(),
        })));
        assert!(matches!(wait_status(res), WaitStatus::Failed(_)));
    }

    #[test]
    fn die_event_carries_exit_code() {
        let msg = EventMessage {
            action: Some("die".into()),
            actor: Some(bollard::models::EventActor {
                id: Some("abc".into()),
                attributes: Some(HashMap::from([
                    ("exitCode".to_string(), "0".to_string()),
                    ("name".to_string(), "meshgate-job-1".to_string()),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(die_exit_code(&msg), Some(0));
        assert_eq!(die_exit_code(&EventMessage::default()), None);
    }
}
