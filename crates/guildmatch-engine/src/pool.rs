//! Waiting pool management and reconciliation.
//!
//! Reconciliation runs the same greedy compatible-group construction as
//! the join path, but seeded from the entire pool: every pool member gets
//! a turn as seed, groups reaching the minimum size are materialized as
//! ACTIVE squads, and the scan repeats over the remainder. The operation
//! is idempotent: with no intervening joins, a second run forms nothing.

use crate::engine::MatchingEngine;
use crate::formation::{grow_compatible_group, GroupMember};
use crate::retry::with_retry;
use guildmatch_core::{
    GuildId, Result, UserEmbedding, UserId, WaitingPoolEntry, MAX_SQUAD_SIZE, MIN_SQUAD_SIZE,
};
use guildmatch_index::cosine_similarity;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Outcome of one reconcile cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub guild_id: GuildId,
    /// True when another reconcile for this guild was already in flight
    pub skipped: bool,
    pub squads_formed: usize,
    pub users_matched: usize,
    pub pool_remaining: usize,
}

impl MatchingEngine {
    /// Waiting pool entries for a guild, ordered by enqueue time.
    /// Read-only snapshot; does not take the guild lock.
    pub async fn get_waiting_pool(&self, guild_id: GuildId) -> Result<Vec<WaitingPoolEntry>> {
        self.require_guild(guild_id).await?;
        self.store().pool_list(guild_id).await
    }

    /// Remove a user's waiting pool entry (explicit guild exit).
    pub async fn leave_waiting_pool(&self, user_id: UserId, guild_id: GuildId) -> Result<bool> {
        self.require_guild(guild_id).await?;
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;
        self.store().pool_remove(guild_id, user_id).await
    }

    /// Convert waiting pool members into new squads where possible.
    ///
    /// Single-flight per guild: an invocation that finds another reconcile
    /// already running returns immediately with `skipped = true`. The pool
    /// scan performs no mutation until every group is built, so an aborted
    /// or cancelled cycle leaves state untouched and is simply retried on
    /// the next trigger.
    pub async fn reconcile_waiting_pool(&self, guild_id: GuildId) -> Result<ReconcileReport> {
        self.require_guild(guild_id).await?;

        let single_flight = self.reconcile_lock(guild_id);
        let Ok(_in_flight) = single_flight.try_lock() else {
            debug!(guild_id = %guild_id, "Reconcile already in flight, skipping");
            let pool_remaining = self.store().pool_list(guild_id).await?.len();
            return Ok(ReconcileReport {
                guild_id,
                skipped: true,
                squads_formed: 0,
                users_matched: 0,
                pool_remaining,
            });
        };

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let entries = self.store().pool_list(guild_id).await?;
        let user_ids: Vec<UserId> = entries.iter().map(|e| e.user_id).collect();
        // A failure here aborts the whole cycle with no partial mutation.
        let embeddings = with_retry(&self.config().retry, || self.index().fetch(&user_ids))
            .await
            .inspect_err(|err| {
                warn!(guild_id = %guild_id, error = %err, "Reconcile aborted before any mutation");
            })?;
        let by_id: HashMap<UserId, UserEmbedding> =
            embeddings.into_iter().map(|e| (e.user_id, e)).collect();

        // Pool members without a published embedding stay pooled untouched.
        let mut remaining: Vec<GroupMember> = entries
            .iter()
            .filter_map(|entry| {
                by_id.get(&entry.user_id).map(|e| GroupMember {
                    user_id: e.user_id,
                    vector: e.vector.clone(),
                    skill_level: e.skill_level,
                })
            })
            .collect();

        let threshold = self.config().compatibility_threshold;
        let mut formed: Vec<Vec<GroupMember>> = Vec::new();
        let mut seed_index = 0;

        while remaining.len() >= MIN_SQUAD_SIZE && seed_index < remaining.len() {
            let seed = remaining[seed_index].clone();
            let mut others: Vec<GroupMember> = remaining
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != seed_index)
                .map(|(_, m)| m.clone())
                .collect();
            others.sort_by(|a, b| {
                cosine_similarity(&seed.vector, &b.vector)
                    .partial_cmp(&cosine_similarity(&seed.vector, &a.vector))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let group = grow_compatible_group(seed, &others, threshold, MAX_SQUAD_SIZE);
            if group.len() >= MIN_SQUAD_SIZE {
                let placed: HashSet<UserId> = group.iter().map(|m| m.user_id).collect();
                remaining.retain(|m| !placed.contains(&m.user_id));
                formed.push(group);
                // The remainder changed shape; rescan from the front.
                seed_index = 0;
            } else {
                seed_index += 1;
            }
        }

        let mut users_matched = 0;
        for group in &formed {
            self.materialize_squad(guild_id, group, None).await?;
            users_matched += group.len();
        }

        let pool_remaining = entries.len() - users_matched;
        if formed.is_empty() {
            debug!(guild_id = %guild_id, pool_remaining, "Reconcile formed no squads");
        } else {
            info!(
                guild_id = %guild_id,
                squads_formed = formed.len(),
                users_matched,
                pool_remaining,
                "Reconcile formed new squads"
            );
        }
        Ok(ReconcileReport {
            guild_id,
            skipped: false,
            squads_formed: formed.len(),
            users_matched,
            pool_remaining,
        })
    }
}
