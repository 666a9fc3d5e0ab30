//! Background reconciliation of waiting pools.
//!
//! One scheduler drives all guilds: a periodic sweep plus an immediate
//! trigger when an enqueue pushes a pool across the formation threshold.
//! Overlapping runs for the same guild are prevented by the engine's
//! per-guild single-flight lock; failed cycles are retried on the next
//! trigger.

use crate::engine::MatchingEngine;
use guildmatch_core::GuildId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodic and event-triggered waiting pool reconciler.
pub struct ReconcileScheduler {
    engine: Arc<MatchingEngine>,
    cancel: CancellationToken,
    rx: mpsc::UnboundedReceiver<GuildId>,
}

impl ReconcileScheduler {
    /// Create a scheduler and register its trigger channel with the
    /// engine, so enqueues that cross the formation threshold wake it
    /// without waiting for the next sweep.
    pub fn new(engine: Arc<MatchingEngine>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        engine.set_reconcile_trigger(tx);
        Self {
            engine,
            cancel: CancellationToken::new(),
            rx,
        }
    }

    /// Token that stops the scheduler loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the scheduler on the runtime until cancelled.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = Duration::from_secs(self.engine.config().reconcile.interval_seconds);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Consume the immediate first tick so the first sweep happens
            // one full period after startup.
            ticker.tick().await;
            info!(period_seconds = period.as_secs(), "Reconcile scheduler started");

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!("Reconcile scheduler stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    Some(guild_id) = self.rx.recv() => {
                        self.run_one(guild_id).await;
                    }
                }
            }
        })
    }

    /// Reconcile every known guild.
    async fn sweep(&self) {
        let guild_ids = match self.engine.guild_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "Reconcile sweep could not list guilds");
                return;
            }
        };
        debug!(guilds = guild_ids.len(), "Reconcile sweep");
        for guild_id in guild_ids {
            self.run_one(guild_id).await;
        }
    }

    async fn run_one(&self, guild_id: GuildId) {
        match self.engine.reconcile_waiting_pool(guild_id).await {
            Ok(report) if report.squads_formed > 0 => {
                info!(
                    guild_id = %guild_id,
                    squads_formed = report.squads_formed,
                    users_matched = report.users_matched,
                    "Scheduled reconcile formed squads"
                );
            }
            Ok(_) => {}
            Err(err) => {
                // The cycle mutated nothing; the next trigger retries it.
                warn!(guild_id = %guild_id, error = %err, "Scheduled reconcile failed");
            }
        }
    }
}
