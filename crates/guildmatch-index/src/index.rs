//! Embedding index client.
//!
//! A thin, strongly-typed contract over an external vector-similarity
//! index. Retrieval is always scoped by structured metadata (interest
//! area, timezone window, optional language) rather than free-form
//! payloads.

use crate::similarity::cosine_similarity;
use async_trait::async_trait;
use dashmap::DashMap;
use guildmatch_core::{MatchError, Result, UserEmbedding, UserId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on `top_k`, capping downstream pairwise-verification cost.
pub const MAX_TOP_K: usize = 100;

/// Structured metadata filter for candidate retrieval.
///
/// Replaces stringly-typed filter payloads with an explicit struct: every
/// retrieval names the interest area, a closed timezone interval, and an
/// optional language restriction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeighborFilter {
    pub interest_area: String,
    /// Closed interval of acceptable UTC offsets, inclusive on both ends
    pub timezone_window: (i32, i32),
    pub language: Option<String>,
}

impl NeighborFilter {
    /// Build the filter for a joining user: their guild's interest area
    /// and a ±`window_hours` interval around their own UTC offset.
    pub fn for_user(
        interest_area: impl Into<String>,
        timezone_offset_hours: i32,
        window_hours: i32,
        language: Option<String>,
    ) -> Self {
        Self {
            interest_area: interest_area.into(),
            timezone_window: (
                timezone_offset_hours - window_hours,
                timezone_offset_hours + window_hours,
            ),
            language,
        }
    }

    /// Whether a published embedding satisfies this filter.
    pub fn matches(&self, embedding: &UserEmbedding) -> bool {
        if embedding.interest_area != self.interest_area {
            return false;
        }
        let (low, high) = self.timezone_window;
        if embedding.timezone_offset_hours < low || embedding.timezone_offset_hours > high {
            return false;
        }
        if let Some(language) = &self.language {
            if &embedding.language_code != language {
                return false;
            }
        }
        true
    }
}

/// A candidate returned by nearest-neighbor retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neighbor {
    pub user_id: UserId,
    /// Cosine similarity to the querying user's vector
    pub similarity: f32,
    pub vector: Vec<f32>,
    pub skill_level: u8,
    pub timezone_offset_hours: i32,
    pub language_code: String,
    pub interest_area: String,
}

impl Neighbor {
    fn from_embedding(embedding: &UserEmbedding, similarity: f32) -> Self {
        Self {
            user_id: embedding.user_id,
            similarity,
            vector: embedding.vector.clone(),
            skill_level: embedding.skill_level,
            timezone_offset_hours: embedding.timezone_offset_hours,
            language_code: embedding.language_code.clone(),
            interest_area: embedding.interest_area.clone(),
        }
    }
}

/// Narrow async contract over the vector-similarity index.
///
/// Transport failures surface as [`MatchError::IndexUnavailable`], which
/// callers retry with bounded backoff. A querying user without a
/// published embedding is [`MatchError::UserHasNoEmbedding`], distinct
/// from an empty result set (a valid "no neighbors" outcome).
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    /// Retrieve up to `top_k` nearest neighbors of `user_id`'s vector,
    /// restricted by `filter`, ordered by similarity descending. The
    /// querying user is never included in the results.
    async fn nearest(
        &self,
        user_id: UserId,
        filter: &NeighborFilter,
        top_k: usize,
    ) -> Result<Vec<Neighbor>>;

    /// Publish or replace a user's embedding.
    async fn upsert(&self, embedding: UserEmbedding) -> Result<()>;

    /// Remove a user's embedding. Returns whether it existed.
    async fn delete(&self, user_id: UserId) -> Result<bool>;

    /// Fetch published embeddings for the given users. Users without a
    /// published embedding are silently absent from the result.
    async fn fetch(&self, user_ids: &[UserId]) -> Result<Vec<UserEmbedding>>;

    /// Fixed dimensionality of every vector in this index.
    fn dimension(&self) -> usize;
}

/// Brute-force in-memory index.
///
/// Exact scan over a [`DashMap`]; retrieval cost is linear in the number
/// of published embeddings, which is the right trade-off at guild scale.
pub struct InMemoryEmbeddingIndex {
    entries: DashMap<UserId, UserEmbedding>,
    dimension: usize,
}

impl InMemoryEmbeddingIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: DashMap::new(),
            dimension,
        }
    }

    /// Number of published embeddings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl EmbeddingIndex for InMemoryEmbeddingIndex {
    async fn nearest(
        &self,
        user_id: UserId,
        filter: &NeighborFilter,
        top_k: usize,
    ) -> Result<Vec<Neighbor>> {
        let query = self
            .entries
            .get(&user_id)
            .map(|entry| entry.vector.clone())
            .ok_or(MatchError::UserHasNoEmbedding(user_id))?;

        let mut neighbors: Vec<Neighbor> = self
            .entries
            .iter()
            .filter(|entry| *entry.key() != user_id && filter.matches(entry.value()))
            .map(|entry| {
                let similarity = cosine_similarity(&query, &entry.value().vector);
                Neighbor::from_embedding(entry.value(), similarity)
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        neighbors.truncate(top_k.min(MAX_TOP_K));

        debug!(
            user_id = %user_id,
            interest_area = %filter.interest_area,
            count = neighbors.len(),
            "Nearest-neighbor retrieval"
        );
        Ok(neighbors)
    }

    async fn upsert(&self, embedding: UserEmbedding) -> Result<()> {
        embedding.validate(self.dimension)?;
        debug!(user_id = %embedding.user_id, "Upserting embedding");
        self.entries.insert(embedding.user_id, embedding);
        Ok(())
    }

    async fn delete(&self, user_id: UserId) -> Result<bool> {
        Ok(self.entries.remove(&user_id).is_some())
    }

    async fn fetch(&self, user_ids: &[UserId]) -> Result<Vec<UserEmbedding>> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.entries.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
