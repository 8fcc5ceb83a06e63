//! Scores subsystem: the chat-facing core.
//!
//! - [`events`]: inbound event model and command grammar.
//! - [`token`]: callback data codec for score buttons.
//! - [`keyboard`]: pure scoreboard → button grid renderer.
//! - [`handlers`]: add / list / adjust operations (store, then re-render).
//! - [`router`]: classifies each event and dispatches to a handler.

pub mod events;
pub mod handlers;
pub mod keyboard;
pub mod router;
pub mod token;

pub use events::InboundEvent;
pub use keyboard::{Button, Keyboard, render};
pub use router::EventRouter;
pub use token::ScoreAction;
