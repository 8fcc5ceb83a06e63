//! Shared state for the comms subsystem: the dispatch boundary for receivers.
//!
//! Receivers hold an `Arc<CommsState>` and can only hand batches over and
//! drain. Every batch runs as one task on a [`TaskTracker`], events inside a
//! batch in arrival order, so the supervisor can wait for in-flight work
//! before exiting.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::subsystems::scores::{EventRouter, InboundEvent};

pub struct CommsState {
    router: Arc<EventRouter>,
    tracker: TaskTracker,
}

impl CommsState {
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self { router, tracker: TaskTracker::new() }
    }

    /// Dispatch `events` on a tracked task. Empty batches are ignored.
    pub fn dispatch_batch(&self, events: Vec<InboundEvent>) {
        if events.is_empty() {
            return;
        }
        debug!(events = events.len(), "dispatching batch");
        let router = Arc::clone(&self.router);
        self.tracker.spawn(async move {
            for event in events {
                router.dispatch(event).await;
            }
        });
    }

    /// Stop accepting batches and wait up to `grace` for in-flight ones.
    ///
    /// Returns `false` when the grace period elapsed first; the remaining
    /// tasks are left to the runtime.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        if self.tracker.is_empty() {
            return true;
        }
        info!(in_flight = self.tracker.len(), "waiting for in-flight dispatches");
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(in_flight = self.tracker.len(), "grace period elapsed with dispatches in flight");
                false
            }
        }
    }
}
