//! Domain types shared by the store gateway and its callers.

use std::fmt;

/// Platform-assigned chat identifier. Partitions all player rows and
/// addresses outbound renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatScope(pub i64);

impl fmt::Display for ChatScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of a chat's scoreboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub score: i64,
}

impl Player {
    pub fn new(name: impl Into<String>, score: i64) -> Self {
        Self { name: name.into(), score }
    }
}

/// A single-step score change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreDelta {
    Increment,
    Decrement,
}

impl ScoreDelta {
    pub fn value(self) -> i64 {
        match self {
            ScoreDelta::Increment => 1,
            ScoreDelta::Decrement => -1,
        }
    }
}
