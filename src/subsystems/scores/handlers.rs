//! Mutation handlers: apply a store change, then re-render the keyboard.
//!
//! Every failure here is logged and swallowed. A store error means the
//! keyboard does not update; a platform error means the user does not see a
//! mutation that did land. Neither is retried.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::platform::ChatPlatform;
use crate::subsystems::store::{ChatScope, ScoreDelta, ScoreStore};

use super::keyboard::{self, Keyboard};
use super::token::{self, ScoreAction};

pub const PLAYERS_TITLE: &str = "Players:";
pub const NO_PLAYERS_TITLE: &str = "No players yet. Use /add <name> to register one.";
pub const ADD_USAGE: &str = "Usage: /add <name>";
pub const RESERVED_NAME_REPLY: &str = "Names cannot start with \"increment:\" or \"decrement:\".";
const ACK_PREFIX: &str = "Hi! I got your message: ";

/// Handlers for the score commands and button presses of every chat.
pub struct ScoreHandlers {
    store: Arc<ScoreStore>,
    platform: Arc<dyn ChatPlatform>,
}

impl ScoreHandlers {
    pub fn new(store: Arc<ScoreStore>, platform: Arc<dyn ChatPlatform>) -> Self {
        Self { store, platform }
    }

    /// `/add <name>`: register a player, then send a fresh keyboard.
    pub async fn add(&self, chat: ChatScope, args: &str) {
        let name = args.trim();
        if name.is_empty() {
            self.reply(chat, ADD_USAGE.to_string()).await;
            return;
        }
        if !token::fits_callback_limit(name) {
            debug!(%chat, len = name.len(), "rejecting oversized player name");
            self.reply(chat, format!("Name is too long (max {} bytes).", token::max_name_bytes()))
                .await;
            return;
        }
        if ScoreAction::decode(name).is_ok() {
            // The label button carries the bare name, so it must stay inert.
            debug!(%chat, player = name, "rejecting name shaped like a score token");
            self.reply(chat, RESERVED_NAME_REPLY.to_string()).await;
            return;
        }

        match self.store.add_player(chat, name).await {
            Ok(true) => info!(%chat, player = name, "player registered"),
            Ok(false) => debug!(%chat, player = name, "player already registered"),
            Err(e) => warn!(%chat, player = name, "add player failed: {e}"),
        }

        self.send_scoreboard(chat).await;
    }

    /// `/players`: send a fresh keyboard.
    pub async fn players(&self, chat: ChatScope) {
        self.send_scoreboard(chat).await;
    }

    /// Button press: adjust the score, edit the pressed message's keyboard in
    /// place, then acknowledge the press.
    pub async fn adjust(&self, callback_id: String, chat: ChatScope, message_id: i32, action: ScoreAction) {
        match self.store.adjust_score(chat, &action.name, action.delta).await {
            Ok(true) => debug!(%chat, player = %action.name, delta = action.delta.value(), "score adjusted"),
            Ok(false) => debug!(%chat, player = %action.name, "score adjustment ignored: unknown player"),
            Err(e) => warn!(%chat, player = %action.name, "adjust score failed: {e}"),
        }

        if let Some(kb) = self.render(chat).await {
            if let Err(e) = self.platform.edit_keyboard(chat, message_id, kb).await {
                warn!(%chat, message_id, "keyboard edit failed: {e}");
            }
        }

        let ack = match action.delta {
            ScoreDelta::Increment => "+1",
            ScoreDelta::Decrement => "-1",
        };
        if let Err(e) = self.platform.answer_callback(callback_id, ack.to_string()).await {
            warn!(%chat, "callback answer failed: {e}");
        }
    }

    /// Freeform text: fixed acknowledgement.
    pub async fn acknowledge(&self, chat: ChatScope, text: &str) {
        debug!(%chat, "freeform message received");
        self.reply(chat, format!("{ACK_PREFIX}{text}")).await;
    }

    async fn send_scoreboard(&self, chat: ChatScope) {
        let Some(kb) = self.render(chat).await else {
            return;
        };
        let title = if kb.is_empty() { NO_PLAYERS_TITLE } else { PLAYERS_TITLE };
        if let Err(e) = self.platform.send_keyboard(chat, title.to_string(), kb).await {
            warn!(%chat, "keyboard send failed: {e}");
        }
    }

    /// Current keyboard for `chat`, or `None` if the store could not be read.
    async fn render(&self, chat: ChatScope) -> Option<Keyboard> {
        match self.store.list_players(chat).await {
            Ok(players) => Some(keyboard::render(&players)),
            Err(e) => {
                warn!(%chat, "list players failed: {e}");
                None
            }
        }
    }

    async fn reply(&self, chat: ChatScope, text: String) {
        if let Err(e) = self.platform.send_text(chat, text).await {
            warn!(%chat, "reply failed: {e}");
        }
    }
}
