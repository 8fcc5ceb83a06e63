//! Bot-platform boundary.
//!
//! The core never touches teloxide directly. It talks to two object-safe
//! capability traits:
//!
//! - [`ChatPlatform`]: outbound send / edit / answer used by the handlers.
//! - [`PlatformControl`]: lifecycle calls used by the supervisor
//!   (authenticate, webhook register / deregister, pull-mode source).
//!
//! [`TelegramPlatform`] implements both on top of a teloxide [`Bot`], and
//! [`inbound_from_update`] converts teloxide updates into [`InboundEvent`]s.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, UpdateKind};
use tracing::debug;

use crate::error::AppError;
use crate::subsystems::comms::EventSource;
use crate::subsystems::comms::polling::LongPollSource;
use crate::subsystems::scores::{InboundEvent, Keyboard};
use crate::subsystems::store::ChatScope;

/// A boxed, owned future returned by platform calls.
pub type PlatformFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 'a>>;

/// Outbound operations available to event handlers.
pub trait ChatPlatform: Send + Sync + 'static {
    /// Send a plain text message.
    fn send_text(&self, chat: ChatScope, text: String) -> PlatformFuture<'_, ()>;

    /// Send a new message carrying `keyboard`. An empty keyboard is valid.
    fn send_keyboard(&self, chat: ChatScope, text: String, keyboard: Keyboard) -> PlatformFuture<'_, ()>;

    /// Replace the keyboard of an existing message in place.
    fn edit_keyboard(&self, chat: ChatScope, message_id: i32, keyboard: Keyboard) -> PlatformFuture<'_, ()>;

    /// Acknowledge a button press so the client stops showing a spinner.
    fn answer_callback(&self, callback_id: String, text: String) -> PlatformFuture<'_, ()>;
}

/// Lifecycle operations used by the supervisor.
pub trait PlatformControl: Send + Sync + 'static {
    /// Verify the token; returns the bot's username.
    fn authenticate(&self) -> PlatformFuture<'_, String>;

    /// Ask the platform to push updates to `url`.
    fn register_webhook(&self, url: Url, secret: Option<String>) -> PlatformFuture<'_, ()>;

    /// Stop push delivery.
    fn deregister_webhook(&self) -> PlatformFuture<'_, ()>;

    /// Event source for pull mode, waiting up to `timeout_secs` per poll.
    fn poll_source(&self, timeout_secs: u32) -> Box<dyn EventSource>;
}

// ── TelegramPlatform ─────────────────────────────────────────────────────────

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    /// Build a client whose HTTP timeout is `request_timeout`.
    ///
    /// Long polling holds requests open for the poll wait, so the timeout
    /// must exceed it.
    pub fn new(token: &str, request_timeout: Duration) -> Result<Self, AppError> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Platform(format!("build http client: {e}")))?;
        Ok(Self { bot: Bot::with_client(token, client) })
    }
}

fn to_markup(keyboard: Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.into_iter().map(|row| {
        row.into_iter()
            .map(|b| InlineKeyboardButton::callback(b.label, b.token))
            .collect::<Vec<_>>()
    }))
}

fn platform_err(op: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Platform(format!("{op}: {e}"))
}

impl ChatPlatform for TelegramPlatform {
    fn send_text(&self, chat: ChatScope, text: String) -> PlatformFuture<'_, ()> {
        Box::pin(async move {
            self.bot
                .send_message(ChatId(chat.0), text)
                .await
                .map(|_| ())
                .map_err(|e| platform_err("sendMessage", e))
        })
    }

    fn send_keyboard(&self, chat: ChatScope, text: String, keyboard: Keyboard) -> PlatformFuture<'_, ()> {
        Box::pin(async move {
            self.bot
                .send_message(ChatId(chat.0), text)
                .reply_markup(to_markup(keyboard))
                .await
                .map(|_| ())
                .map_err(|e| platform_err("sendMessage", e))
        })
    }

    fn edit_keyboard(&self, chat: ChatScope, message_id: i32, keyboard: Keyboard) -> PlatformFuture<'_, ()> {
        Box::pin(async move {
            self.bot
                .edit_message_reply_markup(ChatId(chat.0), MessageId(message_id))
                .reply_markup(to_markup(keyboard))
                .await
                .map(|_| ())
                .map_err(|e| platform_err("editMessageReplyMarkup", e))
        })
    }

    fn answer_callback(&self, callback_id: String, text: String) -> PlatformFuture<'_, ()> {
        Box::pin(async move {
            self.bot
                .answer_callback_query(callback_id)
                .text(text)
                .await
                .map(|_| ())
                .map_err(|e| platform_err("answerCallbackQuery", e))
        })
    }
}

impl PlatformControl for TelegramPlatform {
    fn authenticate(&self) -> PlatformFuture<'_, String> {
        Box::pin(async move {
            let me = self.bot.get_me().await.map_err(|e| platform_err("getMe", e))?;
            Ok(me.username().to_string())
        })
    }

    fn register_webhook(&self, url: Url, secret: Option<String>) -> PlatformFuture<'_, ()> {
        Box::pin(async move {
            let mut req = self.bot.set_webhook(url).allowed_updates(HANDLED_UPDATES);
            if let Some(secret) = secret {
                req = req.secret_token(secret);
            }
            req.await.map(|_| ()).map_err(|e| platform_err("setWebhook", e))
        })
    }

    fn deregister_webhook(&self) -> PlatformFuture<'_, ()> {
        Box::pin(async move {
            self.bot
                .delete_webhook()
                .await
                .map(|_| ())
                .map_err(|e| platform_err("deleteWebhook", e))
        })
    }

    fn poll_source(&self, timeout_secs: u32) -> Box<dyn EventSource> {
        Box::new(LongPollSource::new(self.bot.clone(), timeout_secs))
    }
}

// ── Update conversion ────────────────────────────────────────────────────────

/// Update kinds requested from the platform in both delivery modes.
pub(crate) const HANDLED_UPDATES: [AllowedUpdate; 2] = [AllowedUpdate::Message, AllowedUpdate::CallbackQuery];

/// Convert a platform update into an [`InboundEvent`].
///
/// Returns `None` for update kinds the bot does not handle, messages without
/// text, and callbacks whose originating message is unavailable (no chat to
/// render into).
pub fn inbound_from_update(update: Update) -> Option<InboundEvent> {
    match update.kind {
        UpdateKind::Message(msg) => {
            let text = msg.text()?.to_string();
            Some(InboundEvent::Message { chat: ChatScope(msg.chat.id.0), message_id: msg.id.0, text })
        }
        UpdateKind::CallbackQuery(q) => {
            let Some(message) = q.message else {
                debug!(callback_id = %q.id, "callback without originating message dropped");
                return None;
            };
            Some(InboundEvent::Callback {
                id: q.id,
                chat: ChatScope(message.chat().id.0),
                message_id: message.id().0,
                data: q.data.unwrap_or_default(),
            })
        }
        _ => None,
    }
}

// ── Test double ──────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod fake {
    //! Recording platform used by unit tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::subsystems::comms::SourceFuture;

    /// One recorded outbound call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Outbound {
        Text { chat: ChatScope, text: String },
        Keyboard { chat: ChatScope, text: String, keyboard: Keyboard },
        Edit { chat: ChatScope, message_id: i32, keyboard: Keyboard },
        Answer { callback_id: String, text: String },
    }

    #[derive(Default)]
    pub struct FakePlatform {
        pub sent: Mutex<Vec<Outbound>>,
        pub fail_sends: AtomicBool,
        pub fail_auth: AtomicBool,
        pub fail_deregister: AtomicBool,
        pub registered: AtomicUsize,
        pub deregistered: AtomicUsize,
        /// Batches handed to the next pull-mode source.
        pub poll_batches: Mutex<Vec<Vec<InboundEvent>>>,
    }

    /// Yields scripted batches, then waits forever like an idle long poll.
    pub struct ScriptedSource {
        pub batches: VecDeque<Vec<InboundEvent>>,
    }

    impl EventSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn next_batch(&mut self) -> SourceFuture<'_> {
            Box::pin(async move {
                match self.batches.pop_front() {
                    Some(batch) => Ok(Some(batch)),
                    None => std::future::pending().await,
                }
            })
        }
    }

    impl FakePlatform {
        pub fn outbound(&self) -> Vec<Outbound> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, call: Outbound) -> Result<(), AppError> {
            self.sent.lock().unwrap().push(call);
            if self.fail_sends.load(Ordering::SeqCst) {
                Err(AppError::Platform("send refused".into()))
            } else {
                Ok(())
            }
        }
    }

    impl ChatPlatform for FakePlatform {
        fn send_text(&self, chat: ChatScope, text: String) -> PlatformFuture<'_, ()> {
            Box::pin(async move { self.record(Outbound::Text { chat, text }) })
        }

        fn send_keyboard(&self, chat: ChatScope, text: String, keyboard: Keyboard) -> PlatformFuture<'_, ()> {
            Box::pin(async move { self.record(Outbound::Keyboard { chat, text, keyboard }) })
        }

        fn edit_keyboard(&self, chat: ChatScope, message_id: i32, keyboard: Keyboard) -> PlatformFuture<'_, ()> {
            Box::pin(async move { self.record(Outbound::Edit { chat, message_id, keyboard }) })
        }

        fn answer_callback(&self, callback_id: String, text: String) -> PlatformFuture<'_, ()> {
            Box::pin(async move { self.record(Outbound::Answer { callback_id, text }) })
        }
    }

    impl PlatformControl for FakePlatform {
        fn authenticate(&self) -> PlatformFuture<'_, String> {
            Box::pin(async move {
                if self.fail_auth.load(Ordering::SeqCst) {
                    Err(AppError::Platform("Unauthorized".into()))
                } else {
                    Ok("scorebot".to_string())
                }
            })
        }

        fn register_webhook(&self, _url: Url, _secret: Option<String>) -> PlatformFuture<'_, ()> {
            Box::pin(async move {
                self.registered.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }

        fn deregister_webhook(&self) -> PlatformFuture<'_, ()> {
            Box::pin(async move {
                self.deregistered.fetch_add(1, Ordering::SeqCst);
                if self.fail_deregister.load(Ordering::SeqCst) {
                    Err(AppError::Platform("deleteWebhook: network down".into()))
                } else {
                    Ok(())
                }
            })
        }

        fn poll_source(&self, _timeout_secs: u32) -> Box<dyn EventSource> {
            let batches = std::mem::take(&mut *self.poll_batches.lock().unwrap());
            Box::new(ScriptedSource { batches: batches.into() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::scores::keyboard::Button;

    // Parse from text like the HTTP paths do; `from_value` loses the update
    // kind and yields `UpdateKind::Error`.
    fn update(json: serde_json::Value) -> Update {
        serde_json::from_str(&json.to_string()).expect("valid update json")
    }

    #[test]
    fn markup_mirrors_keyboard_rows() {
        let kb = Keyboard {
            rows: vec![vec![
                Button { label: "Ann (1)".into(), token: "Ann".into() },
                Button { label: "+".into(), token: "increment:Ann".into() },
            ]],
        };
        let markup = to_markup(kb);
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[0][1].text, "+");
    }

    #[test]
    fn empty_keyboard_gives_empty_markup() {
        assert!(to_markup(Keyboard::default()).inline_keyboard.is_empty());
    }

    #[test]
    fn text_message_converts() {
        let ev = inbound_from_update(update(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "date": 1700000000,
                "chat": { "id": 42, "type": "private", "first_name": "Ann" },
                "from": { "id": 7, "is_bot": false, "first_name": "Ann" },
                "text": "/add Bob"
            }
        })));
        assert_eq!(
            ev,
            Some(InboundEvent::Message { chat: ChatScope(42), message_id: 5, text: "/add Bob".into() })
        );
    }

    #[test]
    fn callback_converts() {
        let ev = inbound_from_update(update(serde_json::json!({
            "update_id": 11,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 7, "is_bot": false, "first_name": "Ann" },
                "chat_instance": "ci",
                "data": "increment:Bob",
                "message": {
                    "message_id": 9,
                    "date": 1700000000,
                    "chat": { "id": 42, "type": "private", "first_name": "Ann" },
                    "text": "Players:"
                }
            }
        })));
        assert_eq!(
            ev,
            Some(InboundEvent::Callback {
                id: "cb-1".into(),
                chat: ChatScope(42),
                message_id: 9,
                data: "increment:Bob".into(),
            })
        );
    }

    #[test]
    fn callback_without_message_is_dropped() {
        let ev = inbound_from_update(update(serde_json::json!({
            "update_id": 12,
            "callback_query": {
                "id": "cb-2",
                "from": { "id": 7, "is_bot": false, "first_name": "Ann" },
                "chat_instance": "ci",
                "inline_message_id": "im",
                "data": "increment:Bob"
            }
        })));
        assert_eq!(ev, None);
    }
}
