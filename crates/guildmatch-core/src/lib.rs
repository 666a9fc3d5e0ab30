//! Core types and abstractions for the Guildmatch squad-matching engine.
//!
//! This crate provides the foundational ids, domain types, squad lifecycle
//! rules, configuration, and error handling used across all Guildmatch
//! components.

pub mod config;
pub mod error;
pub mod id;
pub mod types;

pub use config::{MatchingConfig, ReconcileConfig, RetryConfig};
pub use error::{MatchError, Result};
pub use id::{GuildId, SquadId, UserId};
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{MatchingConfig, ReconcileConfig, RetryConfig};
    pub use crate::error::{MatchError, Result};
    pub use crate::id::{GuildId, SquadId, UserId};
    pub use crate::types::*;
}
