//! Formation primitives: candidate-squad ranking and greedy compatible
//! group construction.
//!
//! These are pure functions over snapshots taken under the per-guild
//! lock; all index I/O happens in the callers.

use guildmatch_core::{Squad, SquadId, UserId};
use guildmatch_index::{average_similarity, verify_group};
use std::collections::HashMap;

/// A user eligible for greedy group construction.
#[derive(Debug, Clone)]
pub(crate) struct GroupMember {
    pub user_id: UserId,
    pub vector: Vec<f32>,
    pub skill_level: u8,
}

/// An existing squad ranked against a joining user.
#[derive(Debug, Clone)]
pub(crate) struct RankedSquad {
    pub squad_id: SquadId,
    pub average_similarity: f32,
    pub member_count: usize,
}

/// Rank existing squads with available capacity by the average similarity
/// between the joining user and current members.
///
/// Squads below the threshold are dropped here; the all-pairs gate runs
/// separately on the survivors. Ties on average similarity prefer the
/// larger squad to reduce fragmentation.
pub(crate) fn rank_open_squads(
    joiner_vector: &[f32],
    squads: &[Squad],
    member_vectors: &HashMap<UserId, Vec<f32>>,
    threshold: f32,
) -> Vec<RankedSquad> {
    let mut ranked: Vec<RankedSquad> = squads
        .iter()
        .filter(|squad| squad.status.is_open_for_members() && squad.available_slots() > 0)
        .filter_map(|squad| {
            let vectors: Vec<&[f32]> = squad
                .member_ids
                .iter()
                .filter_map(|id| member_vectors.get(id).map(|v| v.as_slice()))
                .collect();
            if vectors.is_empty() {
                return None;
            }
            let average = average_similarity(joiner_vector, &vectors);
            (average >= threshold).then_some(RankedSquad {
                squad_id: squad.squad_id,
                average_similarity: average,
                member_count: squad.member_ids.len(),
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.average_similarity
            .partial_cmp(&a.average_similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.member_count.cmp(&a.member_count))
            .then_with(|| a.squad_id.cmp(&b.squad_id))
    });
    ranked
}

/// Greedily grow a maximal pairwise-compatible group around `seed`.
///
/// Candidates are consumed in the given preference order (nearest first);
/// each is admitted only if the expanded group still passes the all-pairs
/// gate, and growth stops at `max_size`. The seed is always the first
/// member of the returned group.
pub(crate) fn grow_compatible_group(
    seed: GroupMember,
    candidates: &[GroupMember],
    threshold: f32,
    max_size: usize,
) -> Vec<GroupMember> {
    let mut group = vec![seed];

    for candidate in candidates {
        if group.len() >= max_size {
            break;
        }
        if group.iter().any(|m| m.user_id == candidate.user_id) {
            continue;
        }
        let mut vectors: Vec<&[f32]> = group.iter().map(|m| m.vector.as_slice()).collect();
        vectors.push(&candidate.vector);
        if verify_group(&vectors, threshold) {
            group.push(candidate.clone());
        }
    }

    group
}
