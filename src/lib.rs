//! Scoreboard bot: per-chat player scores driven by inline keyboard buttons.

pub mod config;
pub mod error;
pub mod logger;
pub mod platform;
pub mod subsystems;
pub mod supervisor;
