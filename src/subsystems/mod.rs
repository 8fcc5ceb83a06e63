//! Subsystem modules for the scoreboard bot.

pub mod comms;
pub mod runtime;
pub mod scores;
pub mod store;
