//! Component runtime: shared scaffolding for long-running tasks.
//!
//! # Component model
//!
//! A [`Component`] is one long-running task of the comms subsystem: the
//! receive pump, or the webhook HTTP listener. It captures what it needs at
//! construction; [`Component::run`] only gets the shutdown token and owns
//! its own draining.
//!
//! [`spawn_components`] runs a set of them and returns a [`SubsystemHandle`]
//! for the supervisor to await. A failing component takes its siblings down
//! with it by cancelling the shared [`CancellationToken`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::AppError;

// ── Component ─────────────────────────────────────────────────────────────────

/// A boxed, owned future returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// A self-contained, concurrently-runnable unit.
///
/// [`Component::run`] is called once and should return after `shutdown` is
/// cancelled and the component has finished its own draining.
pub trait Component: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    /// Consume the component and return its run-loop as a boxed future.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

// ── SubsystemHandle ───────────────────────────────────────────────────────────

/// Handle to a running component set.
pub struct SubsystemHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl SubsystemHandle {
    /// Await all components and return the first error, if any.
    pub async fn join(self) -> Result<(), AppError> {
        self.inner
            .await
            .map_err(|e| AppError::Transport(format!("component supervisor task failed: {e}")))?
    }
}

// ── spawn_components ──────────────────────────────────────────────────────────

/// Spawn each [`Component`] as an independent Tokio task.
///
/// The first component to fail (error or panic) cancels `shutdown` so the
/// rest drain cooperatively; the handle then resolves to that first error.
pub fn spawn_components(components: Vec<Box<dyn Component>>, shutdown: CancellationToken) -> SubsystemHandle {
    let inner = tokio::spawn(async move {
        let mut set = JoinSet::new();
        let mut ids = HashMap::new();

        for component in components {
            let id = component.id().to_string();
            let task = set.spawn(component.run(shutdown.clone()));
            debug!(component = %id, "component spawned");
            ids.insert(task.id(), id);
        }

        let mut first_err: Option<AppError> = None;
        while let Some(joined) = set.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, result)) => (task_id, result),
                Err(e) => (e.id(), Err(AppError::Transport(format!("component panicked: {e}")))),
            };
            let id = ids.remove(&task_id).unwrap_or_default();
            match outcome {
                Ok(()) => debug!(component = %id, "component exited"),
                Err(e) => {
                    error!(component = %id, "component failed: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    });

    SubsystemHandle { inner }
}
