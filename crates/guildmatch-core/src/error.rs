//! Error types for the Guildmatch engine.

use crate::id::{GuildId, SquadId, UserId};

/// Result type alias for Guildmatch operations.
pub type Result<T> = std::result::Result<T, MatchError>;

/// Main error type for the Guildmatch engine.
///
/// The taxonomy distinguishes three classes of failure:
/// - transient external failures (`IndexUnavailable`), retried with
///   bounded backoff by the caller;
/// - client errors (`UserHasNoEmbedding`, `GuildNotFound`,
///   `InvalidInput`), surfaced immediately without retry;
/// - invariant violations (`CapacityExceeded`,
///   `CompatibilityViolation`), which indicate a logic error in the
///   formation algorithm and are logged at the highest severity.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The embedding index could not be reached
    #[error("Embedding index unavailable: {0}")]
    IndexUnavailable(String),

    /// The user has not published an embedding yet
    #[error("User {0} has no published embedding")]
    UserHasNoEmbedding(UserId),

    /// The guild does not exist
    #[error("Guild not found: {0}")]
    GuildNotFound(GuildId),

    /// A squad was asked to grow beyond the maximum size
    #[error("Capacity exceeded on squad {squad_id}: size {size}")]
    CapacityExceeded { squad_id: SquadId, size: usize },

    /// A squad reached ACTIVE with an incompatible member pair
    #[error("Pairwise compatibility violation on squad {squad_id}")]
    CompatibilityViolation { squad_id: SquadId },

    /// Vector dimensionality did not match the index
    #[error("Invalid dimension: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage layer errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MatchError {
    /// Create a new index-unavailable error
    pub fn index_unavailable(msg: impl Into<String>) -> Self {
        Self::IndexUnavailable(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// True for failures that are worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::IndexUnavailable(_))
    }

    /// True for failures that indicate a bug in the formation algorithm
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::CompatibilityViolation { .. }
        )
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::GuildNotFound(_) | Self::UserHasNoEmbedding(_))
    }
}
