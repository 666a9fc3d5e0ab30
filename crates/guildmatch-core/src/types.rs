//! Domain types for the matching engine, including the squad lifecycle
//! state machine.

use crate::error::{MatchError, Result};
use crate::id::{GuildId, SquadId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum membership for a squad to become ACTIVE.
pub const MIN_SQUAD_SIZE: usize = 12;

/// Maximum squad membership. Bounds the O(n²) pairwise verification.
pub const MAX_SQUAD_SIZE: usize = 15;

/// Minimum pairwise cosine similarity for two learners to be compatible.
pub const COMPATIBILITY_THRESHOLD: f32 = 0.7;

/// Half-width of the timezone window applied to candidate retrieval.
pub const TIMEZONE_WINDOW_HOURS: i32 = 3;

// ============================================================================
// User embeddings
// ============================================================================

/// A learner's matching attributes as published by the upstream embedding
/// producer. Owned by the matching engine once published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserEmbedding {
    pub user_id: UserId,
    /// Fixed-dimension vector; identical dimensionality across the index
    pub vector: Vec<f32>,
    /// Self-assessed or derived skill level, 1..=10
    pub skill_level: u8,
    /// Lessons-per-week pace signal, non-negative
    pub learning_velocity: f32,
    /// UTC offset in whole hours
    pub timezone_offset_hours: i32,
    /// BCP-47 primary language subtag, e.g. "en"
    pub language_code: String,
    /// Topic the learner wants to be matched on, e.g. "python"
    pub interest_area: String,
}

impl UserEmbedding {
    /// Validate the embedding against the index's fixed dimensionality.
    pub fn validate(&self, expected_dim: usize) -> Result<()> {
        if self.vector.len() != expected_dim {
            return Err(MatchError::DimensionMismatch {
                expected: expected_dim,
                got: self.vector.len(),
            });
        }
        if !(1..=10).contains(&self.skill_level) {
            return Err(MatchError::invalid_input(format!(
                "skill_level must be in 1..=10, got {}",
                self.skill_level
            )));
        }
        if self.learning_velocity < 0.0 || !self.learning_velocity.is_finite() {
            return Err(MatchError::invalid_input(
                "learning_velocity must be finite and non-negative",
            ));
        }
        if self.interest_area.trim().is_empty() {
            return Err(MatchError::invalid_input("interest_area must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Guilds
// ============================================================================

/// A topic-scoped matching namespace. Owns zero or more squads and a
/// single waiting pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guild {
    pub guild_id: GuildId,
    pub interest_area: String,
    pub is_public: bool,
}

impl Guild {
    pub fn new(interest_area: impl Into<String>, is_public: bool) -> Self {
        Self {
            guild_id: GuildId::new(),
            interest_area: interest_area.into(),
            is_public,
        }
    }
}

// ============================================================================
// Squads
// ============================================================================

/// Lifecycle status of a squad.
///
/// FORMING (0-11 members) → ACTIVE (12-15 members) → COMPLETED (terminal).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SquadStatus {
    Forming,
    Active,
    Completed,
}

impl SquadStatus {
    /// Whether the squad may still accept new members (capacity permitting).
    pub fn is_open_for_members(&self) -> bool {
        matches!(self, Self::Forming | Self::Active)
    }
}

/// A size-bounded, pairwise-compatible group of learners.
///
/// Membership is mutated only through [`Squad::add_member`], which enforces
/// the lifecycle rules: activation is one-way and triggered the instant
/// membership reaches the minimum size; a COMPLETED squad is immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Squad {
    pub squad_id: SquadId,
    pub guild_id: GuildId,
    pub status: SquadStatus,
    /// Unique member ids in join order
    pub member_ids: Vec<UserId>,
    pub average_skill_level: f32,
    pub created_at: DateTime<Utc>,
}

impl Squad {
    /// Create an empty FORMING squad in the given guild.
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            squad_id: SquadId::new(),
            guild_id,
            status: SquadStatus::Forming,
            member_ids: Vec::new(),
            average_skill_level: 0.0,
            created_at: Utc::now(),
        }
    }

    /// Current membership count.
    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    /// Whether the squad has no members yet.
    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    /// Remaining capacity, zero for COMPLETED squads.
    pub fn available_slots(&self) -> usize {
        if self.status.is_open_for_members() {
            MAX_SQUAD_SIZE.saturating_sub(self.member_ids.len())
        } else {
            0
        }
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.member_ids.contains(user_id)
    }

    /// Add a member, enforcing lifecycle invariants.
    ///
    /// Returns `true` when this addition transitioned the squad from
    /// FORMING to ACTIVE. The transition fires exactly when membership
    /// first reaches [`MIN_SQUAD_SIZE`] and is never re-evaluated downward.
    ///
    /// # Errors
    /// - `InvalidInput` if the user is already a member or the squad is
    ///   COMPLETED (membership of a completed squad is immutable)
    /// - `CapacityExceeded` if the squad is already at [`MAX_SQUAD_SIZE`];
    ///   the formation algorithm must never let this happen
    pub fn add_member(&mut self, user_id: UserId, skill_level: u8) -> Result<bool> {
        if self.status == SquadStatus::Completed {
            return Err(MatchError::invalid_input(format!(
                "squad {} is completed and immutable",
                self.squad_id
            )));
        }
        if self.contains(&user_id) {
            return Err(MatchError::invalid_input(format!(
                "user {user_id} is already a member of squad {}",
                self.squad_id
            )));
        }
        if self.member_ids.len() >= MAX_SQUAD_SIZE {
            return Err(MatchError::CapacityExceeded {
                squad_id: self.squad_id,
                size: self.member_ids.len() + 1,
            });
        }

        let n = self.member_ids.len() as f32;
        self.average_skill_level =
            (self.average_skill_level * n + skill_level as f32) / (n + 1.0);
        self.member_ids.push(user_id);

        if self.status == SquadStatus::Forming && self.member_ids.len() >= MIN_SQUAD_SIZE {
            self.status = SquadStatus::Active;
            return Ok(true);
        }
        Ok(false)
    }

    /// Mark the squad COMPLETED. Externally triggered only (curriculum
    /// completion); the matching engine never initiates this transition.
    pub fn mark_completed(&mut self) {
        self.status = SquadStatus::Completed;
    }
}

// ============================================================================
// Waiting pool
// ============================================================================

/// A user waiting for a qualifying squad in a guild.
///
/// A user holds at most one entry per guild, and never an entry and a
/// squad membership in the same guild simultaneously.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitingPoolEntry {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub enqueued_at: DateTime<Utc>,
}

impl WaitingPoolEntry {
    pub fn new(user_id: UserId, guild_id: GuildId) -> Self {
        Self {
            user_id,
            guild_id,
            enqueued_at: Utc::now(),
        }
    }
}
