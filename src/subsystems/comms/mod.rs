//! Comms subsystem: receives platform events and hands them to the router.
//!
//! # Architecture
//!
//! Both delivery modes produce events through the same [`EventSource`]
//! interface and are drained by one [`ReceivePump`]:
//!
//! - pull mode: [`polling::LongPollSource`] long-polls the platform;
//! - push mode: [`webhook::WebhookListener`] accepts HTTP pushes and queues
//!   them for a [`webhook::QueueSource`].
//!
//! Each received batch is dispatched as one tracked task on
//! [`CommsState`], so the pump keeps receiving while handlers run. On
//! shutdown the pump stops receiving and waits (bounded) for in-flight
//! dispatches.
//!
//! # Starting
//!
//! [`start`] is synchronous: it returns a [`SubsystemHandle`] as soon as
//! the tasks are spawned.

pub mod polling;
mod state;
pub mod webhook;

pub use state::CommsState;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AppError;
use crate::platform::PlatformControl;
use crate::subsystems::runtime::{Component, ComponentFuture, SubsystemHandle, spawn_components};
use crate::subsystems::scores::InboundEvent;

/// Pause before retrying after a failed receive.
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Capacity of the push-mode queue between the HTTP listener and the pump.
const QUEUE_CAPACITY: usize = 64;

// ── EventSource ───────────────────────────────────────────────────────────────

/// A boxed future returned by [`EventSource::next_batch`].
pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Vec<InboundEvent>>, AppError>> + Send + 'a>>;

/// A stream of inbound event batches.
pub trait EventSource: Send + 'static {
    /// Short label used in log messages.
    fn name(&self) -> &str;

    /// Wait for the next batch. `Ok(None)` means the source is exhausted;
    /// `Err` is transient and the pump retries after a pause.
    fn next_batch(&mut self) -> SourceFuture<'_>;

    /// Stop accepting new events and return whatever is already buffered.
    fn close(&mut self) -> Vec<InboundEvent> {
        Vec::new()
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// What the supervisor resolved for the configured delivery mode.
pub enum Transport {
    Polling {
        source: Box<dyn EventSource>,
    },
    Webhook {
        listener: TcpListener,
        control: Arc<dyn PlatformControl>,
        secret: Option<String>,
    },
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::Polling { .. } => "polling",
            Transport::Webhook { .. } => "webhook",
        }
    }
}

// ── start ─────────────────────────────────────────────────────────────────────

/// Spawn the receive components for `transport`.
///
/// If a component exits with an error the shared `shutdown` token is
/// cancelled so its sibling stops too. `grace` bounds both the wait for
/// in-flight dispatches and the HTTP listener shutdown.
pub fn start(
    transport: Transport,
    state: Arc<CommsState>,
    grace: Duration,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let mut components: Vec<Box<dyn Component>> = Vec::new();

    match transport {
        Transport::Polling { source } => {
            info!("loading long-poll receiver");
            components.push(Box::new(ReceivePump::new("poll0", source, state, grace)));
        }
        Transport::Webhook { listener, control, secret } => {
            info!("loading webhook receiver");
            let (source, queue) = webhook::QueueSource::channel(QUEUE_CAPACITY);
            components.push(Box::new(webhook::WebhookListener::new(
                "webhook0", listener, queue, secret, control, grace,
            )));
            components.push(Box::new(ReceivePump::new("pump0", Box::new(source), state, grace)));
        }
    }

    spawn_components(components, shutdown)
}

// ── ReceivePump ───────────────────────────────────────────────────────────────

/// Pulls batches from an [`EventSource`] and dispatches them.
pub struct ReceivePump {
    id: String,
    source: Box<dyn EventSource>,
    state: Arc<CommsState>,
    grace: Duration,
}

impl ReceivePump {
    pub fn new(id: impl Into<String>, source: Box<dyn EventSource>, state: Arc<CommsState>, grace: Duration) -> Self {
        Self { id: id.into(), source, state, grace }
    }
}

impl Component for ReceivePump {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_pump(*self, shutdown))
    }
}

async fn run_pump(pump: ReceivePump, shutdown: CancellationToken) -> Result<(), AppError> {
    let ReceivePump { id, mut source, state, grace } = pump;
    info!(component = %id, source = source.name(), "receive loop started");

    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = source.next_batch() => received,
        };

        match received {
            Ok(Some(events)) => state.dispatch_batch(events),
            Ok(None) => {
                info!(component = %id, "event source exhausted");
                break;
            }
            Err(e) => {
                warn!(component = %id, "receive failed: {e}");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }

    state.dispatch_batch(source.close());
    state.drain(grace).await;
    info!(component = %id, "receive loop stopped");
    Ok(())
}
