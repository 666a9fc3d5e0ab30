//! End-to-end squad formation demo against the in-memory store and index.
//!
//! This example shows how to:
//! - Wire a `MatchingEngine` from its collaborators
//! - Publish learner embeddings and join a guild
//! - Watch the twelfth compatible join activate a squad
//! - Reconcile the waiting pool
//!
//! Run with: cargo run --example matchmaking

use guildmatch_engine::prelude::*;
use guildmatch_index::{EmbeddingIndex, InMemoryEmbeddingIndex};
use std::sync::Arc;

const DIM: usize = 16;

/// Member `i` of a cohort with pairwise cosine similarity 0.8.
fn cohort_vector(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[0] = 0.8f32.sqrt();
    v[i + 1] = 0.2f32.sqrt();
    v
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let store = Arc::new(InMemoryMatchStore::new());
    let index = Arc::new(InMemoryEmbeddingIndex::new(DIM));
    let engine = MatchingEngine::new(
        MatchingConfig::default(),
        store.clone(),
        index.clone(),
        Arc::new(LogNotifier),
    )?;

    let guild = Guild::new("python", true);
    store.upsert_guild(guild.clone()).await?;
    println!("Created guild {} for '{}'", guild.guild_id, guild.interest_area);

    println!("\nJoining {} compatible learners...", MIN_SQUAD_SIZE);
    for i in 0..MIN_SQUAD_SIZE {
        let user_id = UserId::new();
        index
            .upsert(UserEmbedding {
                user_id,
                vector: cohort_vector(i),
                skill_level: 5,
                learning_velocity: 2.0,
                timezone_offset_hours: 0,
                language_code: "en".to_string(),
                interest_area: "python".to_string(),
            })
            .await?;

        match engine.join_guild(user_id, guild.guild_id).await? {
            JoinOutcome::Waitlisted => {
                println!("  learner {:>2}: waitlisted", i + 1);
            }
            JoinOutcome::SquadAssigned { squad_id } => {
                println!("  learner {:>2}: assigned to squad {squad_id}", i + 1);
            }
        }
    }

    for squad in store.list_squads(guild.guild_id).await? {
        println!(
            "\nSquad {}: {:?}, {} members, average skill {:.1}",
            squad.squad_id,
            squad.status,
            squad.len(),
            squad.average_skill_level
        );
    }

    let report = engine.reconcile_waiting_pool(guild.guild_id).await?;
    println!(
        "\nReconcile: {} squads formed, {} users still waiting",
        report.squads_formed, report.pool_remaining
    );
    Ok(())
}
