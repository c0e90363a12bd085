mod breakpoint;
mod sentences;

pub use breakpoint::BreakpointPolicy;
pub use sentences::split_sentences;

use embeddings::Embeddings;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to embed sentence windows")]
    Embeddings(#[from] embeddings::Error),
}

/// Tunables of the two-level semantic split. Parents are coarse (wide
/// window, conservative threshold); children are fine.
#[derive(Debug, Copy, Clone)]
pub struct ChunkerConfig {
    pub parent_buffer: usize,
    pub parent_policy: BreakpointPolicy,
    pub child_buffer: usize,
    pub child_policy: BreakpointPolicy,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            parent_buffer: 3,
            parent_policy: BreakpointPolicy::Interquartile(1.5),
            child_buffer: 1,
            child_policy: BreakpointPolicy::Percentile(85.0),
        }
    }
}

/// A parent chunk with its child chunks. Search runs over children; the
/// parent text is what gets surfaced for context.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkedDocument {
    pub parent: String,
    pub children: Vec<String>,
}

/// Parent-child semantic chunker. Sentences are embedded in rolling windows,
/// and the stream is cut wherever the cosine distance between adjacent
/// windows exceeds the policy threshold. Identical sentences and embeddings
/// always produce identical boundaries.
pub struct SemanticChunker<E> {
    embeddings: E,
    config: ChunkerConfig,
}

impl<E: Embeddings> SemanticChunker<E> {
    pub fn new(embeddings: E, config: ChunkerConfig) -> Self {
        Self { embeddings, config }
    }

    /// Chunk loader output: parents are cut across all text units, then each
    /// parent is re-split into children. A single-sentence parent is its own
    /// only child.
    pub async fn chunk_units(&self, units: &[String]) -> Result<Vec<ChunkedDocument>, Error> {
        let mut parents = Vec::new();
        for unit in units {
            parents.extend(
                self.split_text(unit, self.config.parent_buffer, self.config.parent_policy)
                    .await?,
            );
        }

        let mut chunked = Vec::with_capacity(parents.len());
        for parent in parents {
            let children = self
                .split_text(&parent, self.config.child_buffer, self.config.child_policy)
                .await?;
            chunked.push(ChunkedDocument { parent, children });
        }

        tracing::debug!(parents = chunked.len(), "chunked document");
        Ok(chunked)
    }

    async fn split_text(
        &self,
        text: &str,
        buffer: usize,
        policy: BreakpointPolicy,
    ) -> Result<Vec<String>, Error> {
        let sentences = split_sentences(text);

        if sentences.len() <= 1 {
            return Ok(sentences);
        }

        let windows = combine_windows(&sentences, buffer);
        let vectors = self.embeddings.embed(&windows).await?;
        let distances = cosine_distances(&vectors);
        let cuts = policy.breakpoints(&distances);

        Ok(cut_sentences(&sentences, &cuts))
    }
}

/// Rolling windows: window i joins sentences [i-buffer, i+buffer], clamped
/// to the ends of the stream.
fn combine_windows(sentences: &[String], buffer: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let start = i.saturating_sub(buffer);
            let end = (i + buffer + 1).min(sentences.len());
            sentences[start..end].join(" ")
        })
        .collect()
}

/// Cosine distance between each adjacent pair of window embeddings.
fn cosine_distances(vectors: &[Vec<f32>]) -> Vec<f64> {
    vectors
        .windows(2)
        .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Cut the sentence stream after every breakpoint index, joining each group
/// with single spaces.
fn cut_sentences(sentences: &[String], cuts: &[usize]) -> Vec<String> {
    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;

    for cut in cuts {
        chunks.push(sentences[start..=*cut].join(" "));
        start = cut + 1;
    }
    if start < sentences.len() {
        chunks.push(sentences[start..].join(" "));
    }

    chunks
}

#[cfg(test)]
mod test {
    use super::*;

    /// Embeds a window as its (alpha-count, beta-count) topic vector, so
    /// cosine distances spike exactly at topic boundaries.
    struct TopicEmbeddings;

    #[async_trait::async_trait]
    impl Embeddings for TopicEmbeddings {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, embeddings::Error> {
            Ok(texts
                .iter()
                .map(|text| {
                    let alpha = text.matches("alpha").count() as f32;
                    let beta = text.matches("beta").count() as f32;
                    vec![alpha, beta]
                })
                .collect())
        }
    }

    fn two_topic_unit() -> String {
        "alpha one. alpha two. alpha three. beta one. beta two. beta three.".to_string()
    }

    fn chunker(parent_policy: BreakpointPolicy) -> SemanticChunker<TopicEmbeddings> {
        SemanticChunker::new(
            TopicEmbeddings,
            ChunkerConfig {
                parent_buffer: 1,
                parent_policy,
                child_buffer: 1,
                child_policy: BreakpointPolicy::Percentile(80.0),
            },
        )
    }

    #[tokio::test]
    async fn cuts_at_the_topic_boundary() {
        let chunker = chunker(BreakpointPolicy::Percentile(80.0));
        let chunked = chunker.chunk_units(&[two_topic_unit()]).await.unwrap();

        let parents: Vec<&str> = chunked.iter().map(|c| c.parent.as_str()).collect();
        assert_eq!(
            parents,
            vec![
                "alpha one. alpha two. alpha three.",
                "beta one. beta two. beta three.",
            ],
        );
    }

    #[tokio::test]
    async fn uniform_parents_have_a_single_child() {
        let chunker = chunker(BreakpointPolicy::Percentile(80.0));
        let chunked = chunker.chunk_units(&[two_topic_unit()]).await.unwrap();

        for chunk in &chunked {
            assert_eq!(chunk.children, vec![chunk.parent.clone()]);
        }
    }

    #[tokio::test]
    async fn single_sentence_unit_is_its_own_parent_and_child() {
        let chunker = chunker(BreakpointPolicy::Interquartile(1.5));
        let chunked = chunker
            .chunk_units(&["just one sentence.".to_string()])
            .await
            .unwrap();

        assert_eq!(chunked.len(), 1);
        assert_eq!(chunked[0].parent, "just one sentence.");
        assert_eq!(chunked[0].children, vec!["just one sentence.".to_string()]);
    }

    #[tokio::test]
    async fn empty_units_chunk_to_nothing() {
        let chunker = chunker(BreakpointPolicy::Percentile(80.0));
        let chunked = chunker
            .chunk_units(&["   ".to_string(), String::new()])
            .await
            .unwrap();
        assert!(chunked.is_empty());
    }

    #[tokio::test]
    async fn chunking_is_deterministic() {
        let chunker = chunker(BreakpointPolicy::Interquartile(1.5));
        let units = [two_topic_unit(), "alpha again. beta again.".to_string()];

        let first = chunker.chunk_units(&units).await.unwrap();
        let second = chunker.chunk_units(&units).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn windows_clamp_at_stream_edges() {
        let sentences: Vec<String> = ["a.", "b.", "c.", "d."]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let windows = combine_windows(&sentences, 1);
        assert_eq!(windows, vec!["a. b.", "a. b. c.", "b. c. d.", "c. d."]);
    }

    #[test]
    fn cut_groups_are_contiguous_and_exhaustive() {
        let sentences: Vec<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            cut_sentences(&sentences, &[1, 3]),
            vec!["a b", "c d", "e"],
        );
        assert_eq!(cut_sentences(&sentences, &[]), vec!["a b c d e"]);
        assert_eq!(
            cut_sentences(&sentences, &[4]),
            vec!["a b c d e"],
        );
    }
}
