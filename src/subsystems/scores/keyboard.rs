//! Keyboard renderer: turns a chat's scoreboard into an inline button grid.
//!
//! Pure: no I/O, no platform types. The platform adapter converts a
//! [`Keyboard`] into its own markup.

use crate::subsystems::store::{Player, ScoreDelta};

use super::token::ScoreAction;

/// A single inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    /// Callback data returned verbatim when the button is pressed.
    pub token: String,
}

/// Rows of inline buttons. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Render one row per player, in the given order:
/// `[ "{name} ({score})" | "+" | "-" ]`.
///
/// The label button's token is the bare name; it decodes to no action.
pub fn render(players: &[Player]) -> Keyboard {
    let rows = players
        .iter()
        .map(|p| {
            vec![
                Button { label: format!("{} ({})", p.name, p.score), token: p.name.clone() },
                Button {
                    label: "+".to_string(),
                    token: ScoreAction::new(ScoreDelta::Increment, p.name.as_str()).encode(),
                },
                Button {
                    label: "-".to_string(),
                    token: ScoreAction::new(ScoreDelta::Decrement, p.name.as_str()).encode(),
                },
            ]
        })
        .collect();
    Keyboard { rows }
}
