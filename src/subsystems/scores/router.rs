//! Event router: classifies an inbound event and hands it to a handler.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::platform::ChatPlatform;
use crate::subsystems::store::ScoreStore;

use super::events::{Command, InboundEvent, MessageKind, classify};
use super::handlers::ScoreHandlers;
use super::token::{ScoreAction, TokenError};

/// Routes every inbound event of every chat. Shared behind `Arc` by all
/// dispatch tasks.
pub struct EventRouter {
    handlers: ScoreHandlers,
    /// Authenticated bot username, for `/cmd@bot` addressing.
    bot_username: String,
}

impl EventRouter {
    pub fn new(store: Arc<ScoreStore>, platform: Arc<dyn ChatPlatform>, bot_username: impl Into<String>) -> Self {
        Self { handlers: ScoreHandlers::new(store, platform), bot_username: bot_username.into() }
    }

    pub async fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message { chat, text, .. } => match classify(&text, &self.bot_username) {
                MessageKind::Command(Command::Add(args)) => self.handlers.add(chat, &args).await,
                MessageKind::Command(Command::Players) => self.handlers.players(chat).await,
                MessageKind::Command(Command::Unknown(keyword)) => {
                    debug!(%chat, %keyword, "ignoring unknown command");
                }
                MessageKind::AddressedElsewhere => {
                    debug!(%chat, "ignoring command addressed to another bot");
                }
                MessageKind::Text => self.handlers.acknowledge(chat, &text).await,
            },
            InboundEvent::Callback { id, chat, message_id, data } => match ScoreAction::decode(&data) {
                Ok(action) => self.handlers.adjust(id, chat, message_id, action).await,
                // Label buttons carry the bare name; pressing one is a no-op.
                Err(TokenError::NoSeparator) => {
                    debug!(%chat, %data, "dropping callback without action");
                }
                Err(e) => {
                    warn!(%chat, %data, "dropping malformed callback: {e}");
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::platform::fake::{FakePlatform, Outbound};
    use crate::subsystems::scores::handlers::{ADD_USAGE, PLAYERS_TITLE};
    use crate::subsystems::scores::keyboard;
    use crate::subsystems::store::{ChatScope, Player, migrations};

    const CHAT: ChatScope = ChatScope(42);

    fn router() -> (TempDir, Arc<ScoreStore>, Arc<FakePlatform>, EventRouter) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scores.db");
        migrations::run(&path).unwrap();
        let store = Arc::new(ScoreStore::connect(&path).unwrap());
        let platform = Arc::new(FakePlatform::default());
        let router = EventRouter::new(store.clone(), platform.clone(), "scorebot");
        (dir, store, platform, router)
    }

    fn message(text: &str) -> InboundEvent {
        InboundEvent::Message { chat: CHAT, message_id: 1, text: text.into() }
    }

    fn press(data: &str) -> InboundEvent {
        InboundEvent::Callback { id: "cb".into(), chat: CHAT, message_id: 9, data: data.into() }
    }

    #[tokio::test]
    async fn scoreboard_scenario() {
        let (_dir, store, platform, router) = router();
        router.dispatch(message("/add Ann")).await;
        router.dispatch(message("/add Bob")).await;
        router.dispatch(press("increment:Bob")).await;
        router.dispatch(press("increment:Bob")).await;

        let players = store.list_players(CHAT).await.unwrap();
        assert_eq!(players, vec![Player::new("Bob", 2), Player::new("Ann", 0)]);

        platform.sent.lock().unwrap().clear();
        router.dispatch(message("/players")).await;
        match platform.outbound().as_slice() {
            [Outbound::Keyboard { text, keyboard: kb, .. }] => {
                assert_eq!(text, PLAYERS_TITLE);
                assert_eq!(kb.rows.len(), 2);
                assert_eq!(kb.rows[0][0].label, "Bob (2)");
                assert_eq!(*kb, keyboard::render(&players));
            }
            other => panic!("unexpected outbound {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_callback_is_silently_dropped() {
        let (_dir, store, platform, router) = router();
        store.add_player(CHAT, "Bob").await.unwrap();

        for data in ["incrementBob", "plus:Bob", "decrement:", "Bob", ""] {
            router.dispatch(press(data)).await;
        }

        assert_eq!(store.list_players(CHAT).await.unwrap(), vec![Player::new("Bob", 0)]);
        assert!(platform.outbound().is_empty());
    }

    #[tokio::test]
    async fn label_presses_never_change_scores() {
        let (_dir, store, platform, router) = router();
        router.dispatch(message("/add Bob")).await;
        router.dispatch(message("/add increment:Bob")).await;
        router.dispatch(message("/add Ann:1")).await;
        router.dispatch(message("/players")).await;

        let labels: Vec<String> = match platform.outbound().last() {
            Some(Outbound::Keyboard { keyboard: kb, .. }) => kb.rows.iter().map(|r| r[0].token.clone()).collect(),
            other => panic!("unexpected outbound {other:?}"),
        };
        assert_eq!(labels, ["Bob", "Ann:1"]);

        platform.sent.lock().unwrap().clear();
        for token in &labels {
            router.dispatch(press(token)).await;
        }

        assert_eq!(
            store.list_players(CHAT).await.unwrap(),
            vec![Player::new("Bob", 0), Player::new("Ann:1", 0)]
        );
        assert!(platform.outbound().is_empty());
    }

    #[tokio::test]
    async fn whitespace_add_gets_usage_hint() {
        let (_dir, store, platform, router) = router();
        router.dispatch(message("/add    ")).await;

        assert!(store.list_players(CHAT).await.unwrap().is_empty());
        assert_eq!(platform.outbound(), vec![Outbound::Text { chat: CHAT, text: ADD_USAGE.into() }]);
    }

    #[tokio::test]
    async fn freeform_text_gets_a_reply() {
        let (_dir, _store, platform, router) = router();
        router.dispatch(message("good game")).await;
        assert!(matches!(platform.outbound().as_slice(), [Outbound::Text { .. }]));
    }

    #[tokio::test]
    async fn unknown_and_foreign_commands_are_ignored() {
        let (_dir, store, platform, router) = router();
        router.dispatch(message("/start")).await;
        router.dispatch(message("/add@otherbot Ann")).await;

        assert!(store.list_players(CHAT).await.unwrap().is_empty());
        assert!(platform.outbound().is_empty());
    }

    #[tokio::test]
    async fn addressed_command_is_handled() {
        let (_dir, store, _platform, router) = router();
        router.dispatch(message("/add@scorebot Ann")).await;
        assert_eq!(store.list_players(CHAT).await.unwrap(), vec![Player::new("Ann", 0)]);
    }
}
