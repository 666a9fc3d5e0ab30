//! Pairwise compatibility verification.
//!
//! Cosine similarity is guaranteed to lie in [-1, 1] by construction.
//! Zero or degenerate vectors yield a similarity of 0 rather than an
//! error: an unpublished or blank profile is simply incompatible with
//! everyone, never a panic.

/// Calculate cosine similarity between two vectors, clamped to [-1, 1].
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = (a.iter().map(|x| x * x).sum::<f32>()).sqrt();
    let norm_b = (b.iter().map(|x| x * x).sum::<f32>()).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Whether two learners clear the minimum-compatibility threshold.
pub fn is_compatible(a: &[f32], b: &[f32], threshold: f32) -> bool {
    cosine_similarity(a, b) >= threshold
}

/// The formation gate: true iff every unordered pair in the group is
/// compatible.
///
/// Being compatible with a centroid or with one seed member is not
/// sufficient; all pairs are checked. O(n²) in group size, which is
/// bounded by the maximum squad size by design.
pub fn verify_group(vectors: &[&[f32]], threshold: f32) -> bool {
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            if !is_compatible(vectors[i], vectors[j], threshold) {
                return false;
            }
        }
    }
    true
}

/// Mean similarity between a query vector and a set of member vectors.
///
/// Used to rank candidate squads for a joining user. Returns 0.0 for an
/// empty member set.
pub fn average_similarity(query: &[f32], members: &[&[f32]]) -> f32 {
    if members.is_empty() {
        return 0.0;
    }
    let total: f32 = members
        .iter()
        .map(|member| cosine_similarity(query, member))
        .sum();
    total / members.len() as f32
}
