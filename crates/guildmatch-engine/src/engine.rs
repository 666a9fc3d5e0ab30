//! The matching engine: squad formation orchestration.
//!
//! All mutating operations (join attempts, new-squad creation, pool
//! reconciliation) are serialized per guild. Index I/O (candidate
//! retrieval and the member-vector prefetch) blocks on the external
//! index and therefore runs before the guild lock is taken; every
//! capacity and compatibility check is re-validated under the lock.

use crate::formation::{grow_compatible_group, rank_open_squads, GroupMember};
use crate::notify::MatchNotifier;
use crate::retry::with_retry;
use crate::store::MatchStore;
use dashmap::DashMap;
use futures::future::join_all;
use guildmatch_core::{
    Guild, GuildId, MatchError, MatchingConfig, Result, Squad, SquadId, UserEmbedding, UserId,
    WaitingPoolEntry, MAX_SQUAD_SIZE, MIN_SQUAD_SIZE,
};
use guildmatch_index::{verify_group, EmbeddingIndex, NeighborFilter};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Result of a join attempt. "No match found" is an expected business
/// outcome, not an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JoinOutcome {
    /// The user was placed into a squad
    SquadAssigned { squad_id: SquadId },
    /// No qualifying squad exists yet; the user waits in the pool
    Waitlisted,
}

/// A candidate squad for a prospective joiner, as surfaced to the API
/// layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadMatch {
    pub squad_id: SquadId,
    pub average_similarity: f32,
    pub available_slots: usize,
}

/// Squad formation engine for one deployment.
///
/// Composed over narrow collaborator contracts: a [`MatchStore`] for
/// records, an [`EmbeddingIndex`] for candidate retrieval, and a
/// [`MatchNotifier`] for best-effort match notifications.
pub struct MatchingEngine {
    config: MatchingConfig,
    store: Arc<dyn MatchStore>,
    index: Arc<dyn EmbeddingIndex>,
    notifier: Arc<dyn MatchNotifier>,
    /// Per-guild serialization of mutating operations
    guild_locks: DashMap<GuildId, Arc<Mutex<()>>>,
    /// Per-guild single-flight guard for reconciliation
    reconcile_locks: DashMap<GuildId, Arc<Mutex<()>>>,
    reconcile_trigger: RwLock<Option<mpsc::UnboundedSender<GuildId>>>,
}

impl MatchingEngine {
    pub fn new(
        config: MatchingConfig,
        store: Arc<dyn MatchStore>,
        index: Arc<dyn EmbeddingIndex>,
        notifier: Arc<dyn MatchNotifier>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            index,
            notifier,
            guild_locks: DashMap::new(),
            reconcile_locks: DashMap::new(),
            reconcile_trigger: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Ids of all guilds known to the store (used by the reconcile sweep).
    pub async fn guild_ids(&self) -> Result<Vec<GuildId>> {
        Ok(self
            .store
            .list_guilds()
            .await?
            .into_iter()
            .map(|g| g.guild_id)
            .collect())
    }

    /// Attempt to place a user into a squad in the given guild.
    ///
    /// The user must have a published embedding; candidate retrieval is
    /// retried on transient index failures. If neither an existing squad
    /// nor a newly built group qualifies, the user is waitlisted.
    pub async fn join_guild(&self, user_id: UserId, guild_id: GuildId) -> Result<JoinOutcome> {
        let guild = self.require_guild(guild_id).await?;
        let embedding = self.require_embedding(user_id).await?;

        let filter = NeighborFilter::for_user(
            guild.interest_area.clone(),
            embedding.timezone_offset_hours,
            self.config.timezone_window_hours,
            None,
        );
        // Candidate retrieval and the member-vector prefetch block on
        // external I/O, so both run before the guild lock; everything they
        // informed is re-validated under the lock.
        let neighbors = with_retry(&self.config.retry, || {
            self.index.nearest(user_id, &filter, self.config.top_k)
        })
        .await?;
        let snapshot = self.store.list_squads(guild_id).await?;
        let member_vectors = self.open_member_vectors(&snapshot).await?;

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let squads = self.store.list_squads(guild_id).await?;

        // Idempotent re-joins: an already-placed user keeps their placement.
        if let Some(squad) = squads
            .iter()
            .find(|s| s.status.is_open_for_members() && s.contains(&user_id))
        {
            debug!(user_id = %user_id, squad_id = %squad.squad_id, "Join is a no-op, user already placed");
            return Ok(JoinOutcome::SquadAssigned {
                squad_id: squad.squad_id,
            });
        }
        let pool = self.store.pool_list(guild_id).await?;
        if pool.iter().any(|e| e.user_id == user_id) {
            debug!(user_id = %user_id, guild_id = %guild_id, "Join is a no-op, user already pooled");
            return Ok(JoinOutcome::Waitlisted);
        }

        // Best existing squad with capacity, ranked by average similarity.
        // A squad that gained a member since the prefetch is missing that
        // member's vector and is skipped rather than admitted unverified.
        if let Some(squad_id) = self
            .try_join_existing(&embedding, &squads, &member_vectors)
            .await?
        {
            return Ok(JoinOutcome::SquadAssigned { squad_id });
        }

        // New squad construction, seeded from the joining user.
        let assigned = assigned_user_set(&squads);
        let candidates: Vec<GroupMember> = neighbors
            .iter()
            .filter(|n| !assigned.contains(&n.user_id))
            .map(|n| GroupMember {
                user_id: n.user_id,
                vector: n.vector.clone(),
                skill_level: n.skill_level,
            })
            .collect();
        let seed = GroupMember {
            user_id,
            vector: embedding.vector.clone(),
            skill_level: embedding.skill_level,
        };
        let group = grow_compatible_group(
            seed,
            &candidates,
            self.config.compatibility_threshold,
            MAX_SQUAD_SIZE,
        );

        if group.len() >= MIN_SQUAD_SIZE {
            let squad = self
                .materialize_squad(guild_id, &group, Some(user_id))
                .await?;
            return Ok(JoinOutcome::SquadAssigned {
                squad_id: squad.squad_id,
            });
        }

        // Fewer than the minimum: discard the tentative group and wait.
        self.store
            .pool_insert(WaitingPoolEntry::new(user_id, guild_id))
            .await?;
        info!(user_id = %user_id, guild_id = %guild_id, "No qualifying squad, user waitlisted");
        self.maybe_trigger_reconcile(guild_id, pool.len() + 1);
        Ok(JoinOutcome::Waitlisted)
    }

    /// Ranked open squads for a prospective joiner. Read-only snapshot;
    /// does not take the guild lock. Full squads carry no available slots
    /// and are excluded.
    pub async fn get_squad_matches(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> Result<Vec<SquadMatch>> {
        self.require_guild(guild_id).await?;
        let embedding = self.require_embedding(user_id).await?;

        let squads = self.store.list_squads(guild_id).await?;
        let member_vectors = self.open_member_vectors(&squads).await?;
        let ranked = rank_open_squads(
            &embedding.vector,
            &squads,
            &member_vectors,
            self.config.compatibility_threshold,
        );

        Ok(ranked
            .into_iter()
            .map(|r| SquadMatch {
                squad_id: r.squad_id,
                average_similarity: r.average_similarity,
                available_slots: MAX_SQUAD_SIZE.saturating_sub(r.member_count),
            })
            .collect())
    }

    /// Apply the external curriculum-completion signal to a squad. The
    /// engine never initiates this transition itself; a COMPLETED squad
    /// stops being a formation target.
    pub async fn mark_squad_completed(&self, squad_id: SquadId) -> Result<()> {
        let Some(squad) = self.store.get_squad(squad_id).await? else {
            return Err(MatchError::invalid_input(format!(
                "unknown squad {squad_id}"
            )));
        };

        let lock = self.guild_lock(squad.guild_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; the snapshot above may be stale.
        let Some(mut squad) = self.store.get_squad(squad_id).await? else {
            return Err(MatchError::invalid_input(format!(
                "unknown squad {squad_id}"
            )));
        };
        squad.mark_completed();
        info!(squad_id = %squad_id, "Squad completed");
        self.store.put_squad(squad).await
    }

    // ------------------------------------------------------------------
    // Internals shared with the waiting pool manager
    // ------------------------------------------------------------------

    pub(crate) fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    pub(crate) fn index(&self) -> &Arc<dyn EmbeddingIndex> {
        &self.index
    }

    pub(crate) fn guild_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.guild_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) fn reconcile_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.reconcile_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) fn set_reconcile_trigger(&self, tx: mpsc::UnboundedSender<GuildId>) {
        *self.reconcile_trigger.write() = Some(tx);
    }

    pub(crate) fn maybe_trigger_reconcile(&self, guild_id: GuildId, pool_len: usize) {
        if pool_len < self.config.reconcile.trigger_pool_size {
            return;
        }
        if let Some(tx) = self.reconcile_trigger.read().as_ref() {
            debug!(guild_id = %guild_id, pool_len, "Pool crossed formation threshold, triggering reconcile");
            // A dropped scheduler is not an error; the periodic sweep covers it.
            let _ = tx.send(guild_id);
        }
    }

    pub(crate) async fn require_guild(&self, guild_id: GuildId) -> Result<Guild> {
        self.store
            .get_guild(guild_id)
            .await?
            .ok_or(MatchError::GuildNotFound(guild_id))
    }

    pub(crate) async fn require_embedding(&self, user_id: UserId) -> Result<UserEmbedding> {
        let ids = [user_id];
        with_retry(&self.config.retry, || self.index.fetch(&ids))
            .await?
            .into_iter()
            .next()
            .ok_or(MatchError::UserHasNoEmbedding(user_id))
    }

    /// Published vectors for every member of every open squad.
    async fn open_member_vectors(&self, squads: &[Squad]) -> Result<HashMap<UserId, Vec<f32>>> {
        let member_ids: Vec<UserId> = squads
            .iter()
            .filter(|s| s.status.is_open_for_members())
            .flat_map(|s| s.member_ids.iter().copied())
            .collect();
        let embeddings = with_retry(&self.config.retry, || self.index.fetch(&member_ids)).await?;
        Ok(embeddings
            .into_iter()
            .map(|e| (e.user_id, e.vector))
            .collect())
    }

    /// Walk ranked squads and attach the joiner to the first one where the
    /// all-pairs gate holds for (members ∪ joiner).
    async fn try_join_existing(
        &self,
        embedding: &UserEmbedding,
        squads: &[Squad],
        member_vectors: &HashMap<UserId, Vec<f32>>,
    ) -> Result<Option<SquadId>> {
        let threshold = self.config.compatibility_threshold;
        let ranked = rank_open_squads(&embedding.vector, squads, member_vectors, threshold);

        for candidate in ranked {
            let Some(squad) = squads.iter().find(|s| s.squad_id == candidate.squad_id) else {
                continue;
            };
            // Every member's vector must be on hand to run the gate.
            if squad
                .member_ids
                .iter()
                .any(|id| !member_vectors.contains_key(id))
            {
                warn!(squad_id = %squad.squad_id, "Squad has members without published embeddings, skipping");
                continue;
            }
            let mut vectors: Vec<&[f32]> = squad
                .member_ids
                .iter()
                .map(|id| member_vectors[id].as_slice())
                .collect();
            vectors.push(&embedding.vector);
            if !verify_group(&vectors, threshold) {
                debug!(
                    squad_id = %squad.squad_id,
                    average_similarity = candidate.average_similarity,
                    "Average cleared the threshold but a pair did not, skipping squad"
                );
                continue;
            }

            let mut updated = squad.clone();
            let activated = updated
                .add_member(embedding.user_id, embedding.skill_level)
                .inspect_err(log_if_invariant_violation)?;
            if activated {
                info!(squad_id = %updated.squad_id, members = updated.len(), "Squad activated");
            }
            info!(
                user_id = %embedding.user_id,
                squad_id = %updated.squad_id,
                members = updated.len(),
                average_similarity = candidate.average_similarity,
                "User joined existing squad"
            );
            self.store.put_squad(updated).await?;
            return Ok(Some(candidate.squad_id));
        }
        Ok(None)
    }

    /// Persist a fully built compatible group as a squad: members come off
    /// the waiting pool, and everyone (minus the synchronous joiner, who
    /// gets the result directly) is notified best-effort.
    pub(crate) async fn materialize_squad(
        &self,
        guild_id: GuildId,
        group: &[GroupMember],
        synchronous_joiner: Option<UserId>,
    ) -> Result<Squad> {
        // Final all-pairs gate. Failure here means the formation algorithm
        // produced an invalid group, which must never be swallowed.
        let vectors: Vec<&[f32]> = group.iter().map(|m| m.vector.as_slice()).collect();
        if !verify_group(&vectors, self.config.compatibility_threshold) {
            let squad_id = SquadId::new();
            let err = MatchError::CompatibilityViolation { squad_id };
            log_if_invariant_violation(&err);
            return Err(err);
        }

        let mut squad = Squad::new(guild_id);
        for member in group {
            squad
                .add_member(member.user_id, member.skill_level)
                .inspect_err(log_if_invariant_violation)?;
        }
        self.store.put_squad(squad.clone()).await?;
        info!(
            squad_id = %squad.squad_id,
            guild_id = %guild_id,
            members = squad.len(),
            status = ?squad.status,
            "New squad formed"
        );

        for member in group {
            self.store.pool_remove(guild_id, member.user_id).await?;
        }

        // Detached best-effort fan-out; delivery neither extends the guild
        // lock hold nor rolls back formation on failure.
        let notifier = self.notifier.clone();
        let group_size = squad.len();
        let recipients: Vec<UserId> = group
            .iter()
            .map(|m| m.user_id)
            .filter(|id| Some(*id) != synchronous_joiner)
            .collect();
        tokio::spawn(async move {
            let deliveries = recipients.into_iter().map(|user_id| {
                let notifier = notifier.clone();
                async move {
                    if let Err(err) = notifier
                        .notify_match_available(user_id, guild_id, group_size)
                        .await
                    {
                        warn!(user_id = %user_id, error = %err, "Match notification failed");
                    }
                }
            });
            join_all(deliveries).await;
        });
        Ok(squad)
    }
}

/// Users currently assigned to an open squad in the guild; they are not
/// candidates for new-squad construction (pool/squad exclusivity).
pub(crate) fn assigned_user_set(squads: &[Squad]) -> HashSet<UserId> {
    squads
        .iter()
        .filter(|s| s.status.is_open_for_members())
        .flat_map(|s| s.member_ids.iter().copied())
        .collect()
}

pub(crate) fn log_if_invariant_violation(err: &MatchError) {
    if err.is_invariant_violation() {
        error!(error = %err, "Formation invariant violated");
    }
}
