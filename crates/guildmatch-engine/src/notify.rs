//! Match-available notification collaborator.
//!
//! Notification delivery is fire-and-forget from the engine's
//! perspective: failures are logged and never roll back or fail a
//! formation operation.

use async_trait::async_trait;
use guildmatch_core::{GuildId, Result, UserId};
use tracing::info;

/// Outbound contract to the external notification service.
#[async_trait]
pub trait MatchNotifier: Send + Sync {
    /// Tell a user a squad is available for them in a guild.
    async fn notify_match_available(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        group_size: usize,
    ) -> Result<()>;
}

/// Default notifier that only records the event in the log stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl MatchNotifier for LogNotifier {
    async fn notify_match_available(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        group_size: usize,
    ) -> Result<()> {
        info!(
            user_id = %user_id,
            guild_id = %guild_id,
            group_size,
            "Match available"
        );
        Ok(())
    }
}
