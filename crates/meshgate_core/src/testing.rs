//! Scripted in-memory [`ContainerRuntime`] for tests.

use crate::error::ComputeError;
use crate::job::*;
use crate::traits::{ContainerRuntime, RunHandle};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum BuildBehavior {
    Succeed,
    Fail(String),
    Hang,
}

#[derive(Debug, Clone)]
enum RunBehavior {
    Events(Vec<Result<RunEvent, ComputeError>>),
    LaunchError(ComputeError),
    Hang,
}

#[derive(Debug)]
struct Inner {
    build_calls: AtomicUsize,
    run_calls: AtomicUsize,
    builds: Mutex<Vec<BuildRequest>>,
    plans: Mutex<Vec<RunPlan>>,
    build: Mutex<BuildBehavior>,
    run: Mutex<RunBehavior>,
}

/// Counts calls and replays a fixed script.
///
/// By default builds succeed and every run prints `ok` and exits with code 0.
#[derive(Debug, Clone)]
pub struct MockRuntime {
    inner: Arc<Inner>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                build_calls: AtomicUsize::new(0),
                run_calls: AtomicUsize::new(0),
                builds: Mutex::new(Vec::new()),
                plans: Mutex::new(Vec::new()),
                build: Mutex::new(BuildBehavior::Succeed),
                run: Mutex::new(RunBehavior::Events(vec![
                    Ok(RunEvent::stdout("ok\n")),
                    Ok(RunEvent::Exited(0)),
                ])),
            }),
        }
    }
}

impl MockRuntime {
    pub fn fail_build(self, message: impl Into<String>) -> Self {
        *self.inner.build.lock().unwrap() = BuildBehavior::Fail(message.into());
        self
    }

    pub fn hang_build(self) -> Self {
        *self.inner.build.lock().unwrap() = BuildBehavior::Hang;
        self
    }

    /// Replays `events` verbatim for every run.
    pub fn with_events(self, events: Vec<Result<RunEvent, ComputeError>>) -> Self {
        *self.inner.run.lock().unwrap() = RunBehavior::Events(events);
        self
    }

    /// Emits each chunk on stdout, then exits with `code`.
    pub fn with_output<I, C>(self, chunks: I, code: i64) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<bytes::Bytes>,
    {
        let events = chunks
            .into_iter()
            .map(|c| Ok(RunEvent::stdout(c)))
            .chain(std::iter::once(Ok(RunEvent::Exited(code))))
            .collect();
        self.with_events(events)
    }

    pub fn fail_launch(self, err: ComputeError) -> Self {
        *self.inner.run.lock().unwrap() = RunBehavior::LaunchError(err);
        self
    }

    /// Starts containers whose output never ends.
    pub fn hang_run(self) -> Self {
        *self.inner.run.lock().unwrap() = RunBehavior::Hang;
        self
    }

    pub fn build_calls(&self) -> usize {
        self.inner.build_calls.load(Ordering::SeqCst)
    }

    pub fn run_calls(&self) -> usize {
        self.inner.run_calls.load(Ordering::SeqCst)
    }

    pub fn last_build(&self) -> Option<BuildRequest> {
        self.inner.builds.lock().unwrap().last().cloned()
    }

    pub fn last_plan(&self) -> Option<RunPlan> {
        self.inner.plans.lock().unwrap().last().cloned()
    }
}

impl ContainerRuntime for MockRuntime {
    async fn build(&self, req: BuildRequest) -> Result<BuildOutput, ComputeError> {
        self.inner.build_calls.fetch_add(1, Ordering::SeqCst);
        let tag = req.tag.clone();
        self.inner.builds.lock().unwrap().push(req);

        let behavior = self.inner.build.lock().unwrap().clone();
        match behavior {
            BuildBehavior::Succeed => Ok(BuildOutput {
                tag,
                log: vec!["Step 1/1 : FROM scratch".to_string()],
            }),
            BuildBehavior::Fail(message) => Err(ComputeError::Build(message)),
            BuildBehavior::Hang => futures::future::pending().await,
        }
    }

    async fn run(&self, plan: RunPlan) -> Result<RunHandle, ComputeError> {
        self.inner.run_calls.fetch_add(1, Ordering::SeqCst);
        let id = format!("mock-{}", plan.tag);
        self.inner.plans.lock().unwrap().push(plan);

        let behavior = self.inner.run.lock().unwrap().clone();
        let events = match behavior {
            RunBehavior::Events(events) => futures::stream::iter(events).boxed(),
            RunBehavior::LaunchError(err) => return Err(err),
            RunBehavior::Hang => futures::stream::pending().boxed(),
        };

        Ok(RunHandle { id, events })
    }
}
