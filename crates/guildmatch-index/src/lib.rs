//! Similarity-based candidate retrieval for Guildmatch.
//!
//! This crate provides the two leaf components of the matching engine:
//!
//! - **Compatibility verifier**: bounded cosine similarity and the
//!   all-pairs group gate that protects squad formation.
//! - **Embedding index client**: a narrow async contract over an external
//!   vector-similarity index, plus an in-memory implementation used for
//!   single-process deployments and tests.

pub mod index;
pub mod similarity;

pub use index::{EmbeddingIndex, InMemoryEmbeddingIndex, Neighbor, NeighborFilter, MAX_TOP_K};
pub use similarity::{average_similarity, cosine_similarity, is_compatible, verify_group};
