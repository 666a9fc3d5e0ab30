//! Storage collaborator for guilds, squads, and waiting pool entries.
//!
//! The engine holds no global mutable pool state between requests: pool
//! membership lives here as records scoped by guild. The trait is the
//! narrow contract a transactional store must satisfy; the in-memory
//! implementation backs single-process deployments and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use guildmatch_core::{Guild, GuildId, Result, Squad, SquadId, UserId, WaitingPoolEntry};
use tracing::debug;

/// Persistence contract required by the matching engine.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Create or replace a guild record.
    async fn upsert_guild(&self, guild: Guild) -> Result<()>;

    /// Fetch a guild by id.
    async fn get_guild(&self, guild_id: GuildId) -> Result<Option<Guild>>;

    /// All known guilds (used by the reconcile sweep).
    async fn list_guilds(&self) -> Result<Vec<Guild>>;

    /// Create or replace a squad record.
    async fn put_squad(&self, squad: Squad) -> Result<()>;

    /// Fetch a squad by id.
    async fn get_squad(&self, squad_id: SquadId) -> Result<Option<Squad>>;

    /// All squads in a guild, in creation order.
    async fn list_squads(&self, guild_id: GuildId) -> Result<Vec<Squad>>;

    /// Add a waiting pool entry. Returns `false` if the user already has
    /// an entry in this guild (a user holds at most one per guild).
    async fn pool_insert(&self, entry: WaitingPoolEntry) -> Result<bool>;

    /// Remove a user's waiting pool entry. Returns whether it existed.
    async fn pool_remove(&self, guild_id: GuildId, user_id: UserId) -> Result<bool>;

    /// Waiting pool entries for a guild, ordered by enqueue time.
    async fn pool_list(&self, guild_id: GuildId) -> Result<Vec<WaitingPoolEntry>>;
}

/// In-memory store over concurrent maps.
#[derive(Default)]
pub struct InMemoryMatchStore {
    guilds: DashMap<GuildId, Guild>,
    squads: DashMap<SquadId, Squad>,
    pools: DashMap<GuildId, Vec<WaitingPoolEntry>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn upsert_guild(&self, guild: Guild) -> Result<()> {
        self.guilds.insert(guild.guild_id, guild);
        Ok(())
    }

    async fn get_guild(&self, guild_id: GuildId) -> Result<Option<Guild>> {
        Ok(self.guilds.get(&guild_id).map(|g| g.value().clone()))
    }

    async fn list_guilds(&self) -> Result<Vec<Guild>> {
        Ok(self.guilds.iter().map(|g| g.value().clone()).collect())
    }

    async fn put_squad(&self, squad: Squad) -> Result<()> {
        debug!(squad_id = %squad.squad_id, members = squad.len(), status = ?squad.status, "Persisting squad");
        self.squads.insert(squad.squad_id, squad);
        Ok(())
    }

    async fn get_squad(&self, squad_id: SquadId) -> Result<Option<Squad>> {
        Ok(self.squads.get(&squad_id).map(|s| s.value().clone()))
    }

    async fn list_squads(&self, guild_id: GuildId) -> Result<Vec<Squad>> {
        let mut squads: Vec<Squad> = self
            .squads
            .iter()
            .filter(|s| s.value().guild_id == guild_id)
            .map(|s| s.value().clone())
            .collect();
        squads.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.squad_id.cmp(&b.squad_id))
        });
        Ok(squads)
    }

    async fn pool_insert(&self, entry: WaitingPoolEntry) -> Result<bool> {
        let mut pool = self.pools.entry(entry.guild_id).or_default();
        if pool.iter().any(|e| e.user_id == entry.user_id) {
            return Ok(false);
        }
        debug!(user_id = %entry.user_id, guild_id = %entry.guild_id, "Enqueued into waiting pool");
        pool.push(entry);
        Ok(true)
    }

    async fn pool_remove(&self, guild_id: GuildId, user_id: UserId) -> Result<bool> {
        let Some(mut pool) = self.pools.get_mut(&guild_id) else {
            return Ok(false);
        };
        let before = pool.len();
        pool.retain(|e| e.user_id != user_id);
        Ok(pool.len() < before)
    }

    async fn pool_list(&self, guild_id: GuildId) -> Result<Vec<WaitingPoolEntry>> {
        let mut entries = self
            .pools
            .get(&guild_id)
            .map(|pool| pool.clone())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at));
        Ok(entries)
    }
}
