//! Push-mode receiver: the platform POSTs updates to `/webhook`.
//!
//! ```text
//! POST /webhook   200 accepted (or ignored update kind)
//!                 400 body is not an update
//!                 401 secret token mismatch
//!                 503 receiver is draining
//! ```
//!
//! The handler only converts and enqueues; dispatch happens on the pump side
//! of the [`QueueSource`].
//!
//! On shutdown [`WebhookListener`] deregisters the webhook (best effort,
//! bounded by the grace period), then stops the HTTP server and gives
//! in-flight requests the same grace period before aborting it.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use teloxide::types::Update;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::{EventSource, SourceFuture};
use crate::error::AppError;
use crate::platform::{PlatformControl, inbound_from_update};
use crate::subsystems::runtime::{Component, ComponentFuture};
use crate::subsystems::scores::InboundEvent;

pub const WEBHOOK_PATH: &str = "/webhook";

/// Header carrying the secret registered with `setWebhook`.
const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Upper bound on reading and handling one request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── Queue ─────────────────────────────────────────────────────────────────────

/// Pump side of the listener queue. Every event is its own batch.
pub struct QueueSource {
    rx: mpsc::Receiver<InboundEvent>,
}

impl QueueSource {
    pub fn channel(capacity: usize) -> (Self, mpsc::Sender<InboundEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { rx }, tx)
    }
}

impl EventSource for QueueSource {
    fn name(&self) -> &str {
        "webhook-queue"
    }

    fn next_batch(&mut self) -> SourceFuture<'_> {
        Box::pin(async move { Ok(self.rx.recv().await.map(|event| vec![event])) })
    }

    fn close(&mut self) -> Vec<InboundEvent> {
        self.rx.close();
        let mut buffered = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            buffered.push(event);
        }
        buffered
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct WebhookState {
    queue: mpsc::Sender<InboundEvent>,
    secret: Option<Arc<str>>,
}

pub(crate) fn build_router(queue: mpsc::Sender<InboundEvent>, secret: Option<&str>) -> Router {
    let state = WebhookState { queue, secret: secret.map(Arc::from) };
    Router::new()
        .route(WEBHOOK_PATH, post(receive_update))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn receive_update(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if let Some(expected) = state.secret.as_deref() {
        let presented = headers.get(SECRET_HEADER).map(|v| v.as_bytes()).unwrap_or_default();
        if !secrets_match(expected.as_bytes(), presented) {
            warn!("webhook request rejected: secret token mismatch");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("webhook request rejected: malformed update: {e}");
            return StatusCode::BAD_REQUEST;
        }
    };

    let update_id = update.id.0;
    let Some(event) = inbound_from_update(update) else {
        debug!(update_id, "ignoring unhandled update");
        return StatusCode::OK;
    };

    let chat = event.chat();
    match state.queue.send(event).await {
        Ok(()) => {
            debug!(update_id, %chat, "update queued");
            StatusCode::OK
        }
        Err(_) => {
            debug!(update_id, "update refused while draining");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Compare without short-circuiting on the first differing byte.
fn secrets_match(expected: &[u8], presented: &[u8]) -> bool {
    if expected.len() != presented.len() {
        return false;
    }
    expected.iter().zip(presented).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

// ── WebhookListener ───────────────────────────────────────────────────────────

pub struct WebhookListener {
    id: String,
    listener: TcpListener,
    queue: mpsc::Sender<InboundEvent>,
    secret: Option<String>,
    control: Arc<dyn PlatformControl>,
    grace: Duration,
}

impl WebhookListener {
    pub fn new(
        id: impl Into<String>,
        listener: TcpListener,
        queue: mpsc::Sender<InboundEvent>,
        secret: Option<String>,
        control: Arc<dyn PlatformControl>,
        grace: Duration,
    ) -> Self {
        Self { id: id.into(), listener, queue, secret, control, grace }
    }
}

impl Component for WebhookListener {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_listener(*self, shutdown))
    }
}

async fn run_listener(listener: WebhookListener, shutdown: CancellationToken) -> Result<(), AppError> {
    let WebhookListener { id, listener, queue, secret, control, grace } = listener;

    let addr = listener.local_addr()?;
    let router = build_router(queue, secret.as_deref());

    let stop = CancellationToken::new();
    let server_stop = stop.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_stop.cancelled().await })
            .await
    });
    info!(component = %id, %addr, path = WEBHOOK_PATH, "webhook listener started");

    tokio::select! {
        _ = shutdown.cancelled() => {}
        exited = &mut server => {
            return match exited {
                Ok(Ok(())) => Err(AppError::Transport("webhook server exited unexpectedly".into())),
                Ok(Err(e)) => Err(AppError::Transport(format!("webhook server error: {e}"))),
                Err(e) => Err(AppError::Transport(format!("webhook server panicked: {e}"))),
            };
        }
    }

    match tokio::time::timeout(grace, control.deregister_webhook()).await {
        Ok(Ok(())) => info!(component = %id, "webhook deregistered"),
        Ok(Err(e)) => warn!(component = %id, "webhook deregistration failed: {e}"),
        Err(_) => warn!(component = %id, "webhook deregistration timed out"),
    }

    stop.cancel();
    match tokio::time::timeout(grace, &mut server).await {
        Ok(Ok(Ok(()))) => info!(component = %id, "webhook listener stopped"),
        Ok(Ok(Err(e))) => warn!(component = %id, "webhook server error during shutdown: {e}"),
        Ok(Err(e)) => warn!(component = %id, "webhook server task failed: {e}"),
        Err(_) => {
            warn!(component = %id, "grace period elapsed; aborting webhook listener");
            server.abort();
        }
    }
    Ok(())
}
