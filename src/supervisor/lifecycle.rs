//! Process lifecycle phases, published on a [`watch`] channel.

use std::fmt;

use tokio::sync::watch;
use tracing::{info, warn};

/// Supervisor phase. Ordered: a process only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Starting,
    Ready,
    Draining,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Starting => "starting",
            Phase::Ready => "ready",
            Phase::Draining => "draining",
            Phase::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

pub struct Lifecycle {
    tx: watch::Sender<Phase>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { tx: watch::Sender::new(Phase::Starting) }
    }

    pub fn phase(&self) -> Phase {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }

    /// Move to `next`. Backward or repeated transitions are ignored and
    /// return `false`.
    pub fn advance(&self, next: Phase) -> bool {
        let current = self.phase();
        if next <= current {
            warn!(%current, %next, "ignoring lifecycle transition");
            return false;
        }
        self.tx.send_replace(next);
        info!(from = %current, to = %next, "lifecycle");
        true
    }
}
