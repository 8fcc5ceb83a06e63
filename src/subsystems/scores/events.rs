//! Inbound event model and command grammar.
//!
//! Platform updates are converted once into an [`InboundEvent`]; everything
//! downstream works on these types only.

use crate::subsystems::store::ChatScope;

/// A pending update, owned by the task handling it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A text message (command or freeform).
    Message { chat: ChatScope, message_id: i32, text: String },
    /// An inline button press on a message the bot sent earlier.
    Callback {
        /// Platform id used to acknowledge the press.
        id: String,
        chat: ChatScope,
        /// The message carrying the pressed keyboard; edited in place.
        message_id: i32,
        data: String,
    },
}

impl InboundEvent {
    pub fn chat(&self) -> ChatScope {
        match self {
            InboundEvent::Message { chat, .. } | InboundEvent::Callback { chat, .. } => *chat,
        }
    }
}

/// Recognised bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/add <name>`: raw, untrimmed argument text.
    Add(String),
    /// `/players`
    Players,
    /// Any other `/keyword`.
    Unknown(String),
}

/// How the router should treat a text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Command(Command),
    /// `/cmd@otherbot`: meant for a different bot in the same chat.
    AddressedElsewhere,
    /// Freeform text.
    Text,
}

/// Classify `text`, accepting `/cmd@bot_username` only for this bot.
pub fn classify(text: &str, bot_username: &str) -> MessageKind {
    let Some(body) = text.strip_prefix('/') else {
        return MessageKind::Text;
    };

    let (head, args) = match body.find(char::is_whitespace) {
        Some(idx) => (&body[..idx], &body[idx..]),
        None => (body, ""),
    };

    let keyword = match head.split_once('@') {
        Some((keyword, target)) => {
            if !target.eq_ignore_ascii_case(bot_username) {
                return MessageKind::AddressedElsewhere;
            }
            keyword
        }
        None => head,
    };

    if keyword.is_empty() {
        return MessageKind::Text;
    }

    MessageKind::Command(match keyword {
        "add" => Command::Add(args.to_string()),
        "players" => Command::Players,
        other => Command::Unknown(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: &str = "scorebot";

    #[test]
    fn add_with_argument() {
        assert_eq!(classify("/add Ann", BOT), MessageKind::Command(Command::Add(" Ann".into())));
    }

    #[test]
    fn add_keeps_inner_whitespace() {
        match classify("/add  Ann Lee ", BOT) {
            MessageKind::Command(Command::Add(args)) => assert_eq!(args.trim(), "Ann Lee"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn add_without_argument() {
        assert_eq!(classify("/add", BOT), MessageKind::Command(Command::Add(String::new())));
        assert_eq!(classify("/add   ", BOT), MessageKind::Command(Command::Add("   ".into())));
    }

    #[test]
    fn players_command() {
        assert_eq!(classify("/players", BOT), MessageKind::Command(Command::Players));
        assert_eq!(classify("/players extra", BOT), MessageKind::Command(Command::Players));
    }

    #[test]
    fn bot_suffix_must_match() {
        assert_eq!(classify("/players@scorebot", BOT), MessageKind::Command(Command::Players));
        assert_eq!(classify("/players@ScoreBot", BOT), MessageKind::Command(Command::Players));
        assert_eq!(classify("/add@scorebot Bob", BOT), MessageKind::Command(Command::Add(" Bob".into())));
        assert_eq!(classify("/players@otherbot", BOT), MessageKind::AddressedElsewhere);
    }

    #[test]
    fn unknown_command() {
        assert_eq!(classify("/start", BOT), MessageKind::Command(Command::Unknown("start".into())));
    }

    #[test]
    fn freeform_text() {
        assert_eq!(classify("hello there", BOT), MessageKind::Text);
        assert_eq!(classify("/", BOT), MessageKind::Text);
        assert_eq!(classify("/ add", BOT), MessageKind::Text);
        assert_eq!(classify("", BOT), MessageKind::Text);
    }

    #[test]
    fn event_chat_accessor() {
        let ev = InboundEvent::Callback { id: "q".into(), chat: ChatScope(7), message_id: 1, data: String::new() };
        assert_eq!(ev.chat(), ChatScope(7));
    }
}
