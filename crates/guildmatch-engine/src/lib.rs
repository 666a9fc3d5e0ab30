//! Squad formation engine for Guildmatch.
//!
//! This crate turns candidate retrieval into squads:
//!
//! - **Formation orchestrator** ([`MatchingEngine::join_guild`]): attach a
//!   joining user to the best-ranked existing squad, build a new squad
//!   from the candidate pool, or waitlist them.
//! - **Waiting pool manager**: enqueue/dequeue/list plus the batch
//!   [`MatchingEngine::reconcile_waiting_pool`] operation that converts
//!   pool members into new squads.
//! - **Reconcile scheduler**: background task driving reconciliation
//!   periodically and when a pool grows past the formation threshold.
//!
//! All mutating operations are serialized per guild; guilds are
//! independent units of concurrency.

pub mod engine;
pub mod formation;
pub mod notify;
pub mod pool;
pub mod reconciler;
pub mod retry;
pub mod store;

pub use engine::{JoinOutcome, MatchingEngine, SquadMatch};
pub use notify::{LogNotifier, MatchNotifier};
pub use pool::ReconcileReport;
pub use reconciler::ReconcileScheduler;
pub use retry::with_retry;
pub use store::{InMemoryMatchStore, MatchStore};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::engine::{JoinOutcome, MatchingEngine, SquadMatch};
    pub use crate::notify::{LogNotifier, MatchNotifier};
    pub use crate::pool::ReconcileReport;
    pub use crate::reconciler::ReconcileScheduler;
    pub use crate::store::{InMemoryMatchStore, MatchStore};
    pub use guildmatch_core::prelude::*;
}
