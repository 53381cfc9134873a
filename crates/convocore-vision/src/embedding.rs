/// Cosine similarity of two equal-length embedding vectors. Returns `-1.0`
/// (minimum possible similarity) if either vector is zero-length or the
/// lengths differ, since neither is a meaningful comparison.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return -1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return -1.0;
    }
    dot / (norm_a * norm_b)
}

/// One known face, flattened for argmax matching: every photo embedding of
/// an identity counts as a separate candidate, the best of which wins.
#[derive(Debug, Clone)]
pub struct KnownEmbedding {
    pub identity_name: String,
    pub vector: Vec<f32>,
}

/// All of a user's known face embeddings, held in memory for the life of
/// their vision session — loaded once, not refetched per frame.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingCache {
    known: Vec<KnownEmbedding>,
}

impl EmbeddingCache {
    pub fn new(known: Vec<KnownEmbedding>) -> Self {
        Self { known }
    }

    /// Best match for `embedding` above `threshold`, or `None` if every
    /// known embedding scores below it.
    pub fn best_match(&self, embedding: &[f32], threshold: f32) -> Option<(&str, f32)> {
        self.known
            .iter()
            .map(|k| (k.identity_name.as_str(), cosine_similarity(embedding, &k.vector)))
            .filter(|(_, score)| *score >= threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_are_never_a_match() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), -1.0);
    }

    #[test]
    fn best_match_picks_highest_scoring_identity_above_threshold() {
        let cache = EmbeddingCache::new(vec![
            KnownEmbedding { identity_name: "Alice".into(), vector: vec![1.0, 0.0] },
            KnownEmbedding { identity_name: "Bob".into(), vector: vec![0.0, 1.0] },
        ]);
        let (name, score) = cache.best_match(&[0.9, 0.1], 0.5).unwrap();
        assert_eq!(name, "Alice");
        assert!(score > 0.5);
    }

    #[test]
    fn no_match_below_threshold() {
        let cache = EmbeddingCache::new(vec![KnownEmbedding { identity_name: "Alice".into(), vector: vec![1.0, 0.0] }]);
        assert!(cache.best_match(&[0.0, 1.0], 0.5).is_none());
    }
}
