//! Vector similarity utilities.

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ, either vector is empty or all zeros,
/// or a component is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    let sim = dot / denom;
    if !sim.is_finite() {
        return 0.0;
    }
    sim as f32
}

/// Find the candidate most similar to `query` at or above `threshold`.
///
/// Returns the candidate's index and its similarity. Ties keep the earliest
/// candidate.
pub fn best_match<'a, I>(query: &[f32], candidates: I, threshold: f32) -> Option<(usize, f32)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut best: Option<(usize, f32)> = None;
    for (i, candidate) in candidates.into_iter().enumerate() {
        let sim = cosine_similarity(query, candidate);
        if sim < threshold {
            continue;
        }
        match best {
            Some((_, best_sim)) if best_sim >= sim => {}
            _ => best = Some((i, sim)),
        }
    }
    best
}
