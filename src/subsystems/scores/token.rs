//! Render tokens: the callback data attached to score buttons.
//!
//! Wire form is `"<action>:<name>"` with action `increment` or `decrement`.
//! Decoding fails closed: anything else is rejected with a reason the router
//! logs before dropping the callback.

use thiserror::Error;

use crate::subsystems::store::ScoreDelta;

/// Platform limit on callback data, in bytes.
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

const INCREMENT: &str = "increment";
const DECREMENT: &str = "decrement";

/// A decoded button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreAction {
    pub delta: ScoreDelta,
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("no ':' separator")]
    NoSeparator,
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("empty player name")]
    EmptyName,
}

impl ScoreAction {
    pub fn new(delta: ScoreDelta, name: impl Into<String>) -> Self {
        Self { delta, name: name.into() }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", action_word(self.delta), self.name)
    }

    pub fn decode(data: &str) -> Result<Self, TokenError> {
        let (action, name) = data.split_once(':').ok_or(TokenError::NoSeparator)?;
        let delta = match action {
            INCREMENT => ScoreDelta::Increment,
            DECREMENT => ScoreDelta::Decrement,
            other => return Err(TokenError::UnknownAction(other.to_string())),
        };
        if name.is_empty() {
            return Err(TokenError::EmptyName);
        }
        Ok(Self { delta, name: name.to_string() })
    }
}

fn action_word(delta: ScoreDelta) -> &'static str {
    match delta {
        ScoreDelta::Increment => INCREMENT,
        ScoreDelta::Decrement => DECREMENT,
    }
}

/// `true` if every token rendered for `name` fits the platform limit.
pub fn fits_callback_limit(name: &str) -> bool {
    let longest = INCREMENT.len().max(DECREMENT.len()) + 1 + name.len();
    longest <= MAX_CALLBACK_DATA_BYTES
}

/// Longest player name (in bytes) that still fits the callback limit.
pub fn max_name_bytes() -> usize {
    MAX_CALLBACK_DATA_BYTES - INCREMENT.len().max(DECREMENT.len()) - 1
}
