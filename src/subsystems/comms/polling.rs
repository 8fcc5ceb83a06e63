//! Pull-mode receiver: Telegram long polling.
//!
//! Each poll waits up to `timeout_secs` for updates. The offset advances past
//! every update seen, including ones the bot ignores, so nothing is fetched
//! twice.

use teloxide::prelude::*;
use tracing::trace;

use super::{EventSource, SourceFuture};
use crate::error::AppError;
use crate::platform::{HANDLED_UPDATES, inbound_from_update};

pub struct LongPollSource {
    bot: Bot,
    offset: i32,
    timeout_secs: u32,
}

impl LongPollSource {
    pub fn new(bot: Bot, timeout_secs: u32) -> Self {
        Self { bot, offset: 0, timeout_secs }
    }
}

impl EventSource for LongPollSource {
    fn name(&self) -> &str {
        "long-poll"
    }

    fn next_batch(&mut self) -> SourceFuture<'_> {
        Box::pin(async move {
            let updates = self
                .bot
                .get_updates()
                .offset(self.offset)
                .timeout(self.timeout_secs)
                .allowed_updates(HANDLED_UPDATES)
                .await
                .map_err(|e| AppError::Transport(format!("getUpdates: {e}")))?;

            trace!(count = updates.len(), offset = self.offset, "poll returned");
            let mut events = Vec::with_capacity(updates.len());
            for update in updates {
                self.offset = update.id.0 as i32 + 1;
                events.extend(inbound_from_update(update));
            }
            Ok(Some(events))
        })
    }
}
