//! Supervisor: owns the process lifecycle.
//!
//! ```text
//! Starting ──► Ready ──► Draining ──► Stopped
//!    └──────────────────────────────────┘   (fatal startup error)
//! ```
//!
//! Starting runs migrations, opens the store, authenticates with the
//! platform and prepares the configured delivery mode. Any failure there is
//! fatal. Ready runs the comms components until the shutdown token fires (a
//! signal, or a component error). Draining lets the comms components finish
//! within the configured grace period.

pub mod lifecycle;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, DeliveryMode};
use crate::error::AppError;
use crate::platform::{ChatPlatform, PlatformControl, TelegramPlatform};
use crate::subsystems::comms::{self, CommsState, Transport};
use crate::subsystems::scores::EventRouter;
use crate::subsystems::store::{ScoreStore, migrations};

pub use lifecycle::{Lifecycle, Phase};

/// Headroom added to the long-poll wait for the HTTP client timeout.
const POLL_REQUEST_HEADROOM: Duration = Duration::from_secs(10);

/// Run the bot against Telegram until `shutdown` is cancelled.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), AppError> {
    let request_timeout = Duration::from_secs(u64::from(config.poll_timeout_secs)) + POLL_REQUEST_HEADROOM;
    let platform = Arc::new(TelegramPlatform::new(&config.bot_token, request_timeout)?);
    Supervisor::new(config, platform).run(shutdown).await
}

pub struct Supervisor<P> {
    config: Config,
    platform: Arc<P>,
    lifecycle: Lifecycle,
}

impl<P: ChatPlatform + PlatformControl> Supervisor<P> {
    pub fn new(config: Config, platform: Arc<P>) -> Self {
        Self { config, platform, lifecycle: Lifecycle::new() }
    }

    pub fn lifecycle(&self) -> watch::Receiver<Phase> {
        self.lifecycle.subscribe()
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AppError> {
        let (state, transport) = match self.start().await {
            Ok(started) => started,
            Err(e) => {
                error!("startup failed: {e}");
                self.lifecycle.advance(Phase::Stopped);
                return Err(e);
            }
        };

        let mode = transport.name();
        let handle = comms::start(transport, state, self.config.shutdown_grace, shutdown.clone());
        self.lifecycle.advance(Phase::Ready);
        info!(mode, "scorebot ready");

        let joined = handle.join();
        tokio::pin!(joined);
        let early = tokio::select! {
            _ = shutdown.cancelled() => None,
            result = &mut joined => Some(result),
        };

        self.lifecycle.advance(Phase::Draining);
        shutdown.cancel();
        let result = match early {
            Some(result) => result,
            None => joined.await,
        };

        self.lifecycle.advance(Phase::Stopped);
        result
    }

    async fn start(&self) -> Result<(Arc<CommsState>, Transport), AppError> {
        let db_path = self.config.database_path.clone();
        let report = tokio::task::spawn_blocking(move || migrations::run(&db_path))
            .await
            .map_err(|e| AppError::Migration(format!("migration task failed: {e}")))??;
        info!(
            from = report.from_version,
            to = report.to_version,
            applied = ?report.applied,
            "schema ready"
        );

        let store = Arc::new(ScoreStore::connect(&self.config.database_path)?);

        let username = self.platform.authenticate().await?;
        info!(bot = %username, "platform authenticated");

        let transport = match &self.config.mode {
            DeliveryMode::Polling => {
                // getUpdates is refused while a webhook is set.
                if let Err(e) = self.platform.deregister_webhook().await {
                    warn!("could not clear webhook before polling: {e}");
                }
                Transport::Polling { source: self.platform.poll_source(self.config.poll_timeout_secs) }
            }
            DeliveryMode::Webhook(hook) => {
                let listener = TcpListener::bind(("0.0.0.0", hook.port))
                    .await
                    .map_err(|e| AppError::Transport(format!("bind 0.0.0.0:{}: {e}", hook.port)))?;
                self.platform.register_webhook(hook.url.clone(), hook.secret.clone()).await?;
                info!(url = %hook.url, port = hook.port, "webhook registered");
                let control: Arc<dyn PlatformControl> = self.platform.clone();
                Transport::Webhook { listener, control, secret: hook.secret.clone() }
            }
        };

        let router = Arc::new(EventRouter::new(store, self.platform.clone(), username));
        Ok((Arc::new(CommsState::new(router)), transport))
    }
}

// ── Signals ───────────────────────────────────────────────────────────────────

/// Cancel `shutdown` on Ctrl-C, or SIGTERM on unix.
pub fn spawn_signal_watcher(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.cancel();
    });
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("ctrl-c received, initiating shutdown"),
        Err(e) => {
            warn!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = wait_for_ctrl_c() => {}
                _ = term.recv() => info!("SIGTERM received, initiating shutdown"),
            }
        }
        Err(e) => {
            warn!("cannot listen for SIGTERM: {e}");
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}
