//! Semantic index over dataset documents.
//!
//! Documents are split into character-bounded chunks, each chunk is embedded,
//! and queries are answered by cosine similarity. The index lives in memory
//! and is rebuilt for every query; there is no incremental update.

use std::collections::VecDeque;
use std::time::Instant;

use crate::config::IndexSettings;
use crate::models::{Chunk, Document};
use crate::progress::{PipelineEvent, ProgressReporter, SilentReporter};
use crate::traits::EmbeddingProvider;
use crate::AppError;

const SEPARATOR: &str = "\n\n";

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits text on blank lines, then packs the pieces into chunks of at most
/// `chunk_size` characters. A piece longer than `chunk_size` is cut at
/// character boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(1000, 0)
    }
}

impl TextSplitter {
    /// `chunk_size` is clamped to at least 1 and `chunk_overlap` to below it.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let pieces: Vec<String> = text
            .split(SEPARATOR)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .flat_map(|p| self.cut(p))
            .collect();
        self.merge(pieces)
    }

    fn cut(&self, piece: &str) -> Vec<String> {
        if char_len(piece) <= self.chunk_size {
            return vec![piece.to_string()];
        }

        let chars: Vec<char> = piece.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut out = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        out
    }

    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let sep_len = char_len(SEPARATOR);
        let mut chunks = Vec::new();
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(&piece);
            let joined = |window: &VecDeque<(String, usize)>| {
                window
                    .iter()
                    .map(|(p, _)| p.as_str())
                    .collect::<Vec<_>>()
                    .join(SEPARATOR)
            };

            if !window.is_empty() && total + sep_len + len > self.chunk_size {
                chunks.push(joined(&window));
                // keep a tail no longer than the overlap that still leaves room
                while let Some((_, front_len)) = window.front() {
                    let fits = total + sep_len + len <= self.chunk_size;
                    if total <= self.chunk_overlap && fits {
                        break;
                    }
                    total -= front_len + if window.len() > 1 { sep_len } else { 0 };
                    window.pop_front();
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back((piece, len));
        }

        if !window.is_empty() {
            chunks.push(
                window
                    .iter()
                    .map(|(p, _)| p.as_str())
                    .collect::<Vec<_>>()
                    .join(SEPARATOR),
            );
        }
        chunks
    }
}

/// Cosine similarity, 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// A source document ranked by its best-matching chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument<'a> {
    pub document: &'a Document,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// Embedded chunks plus the documents they came from.
#[derive(Debug, Clone, Default)]
pub struct SimilarityIndex {
    documents: Vec<Document>,
    entries: Vec<IndexEntry>,
}

impl SimilarityIndex {
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `k` distinct documents for an embedded query. Equal scores keep
    /// insertion order.
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<ScoredDocument<'_>> {
        let mut best: Vec<Option<f32>> = vec![None; self.documents.len()];
        for entry in &self.entries {
            let score = cosine_similarity(&entry.embedding, query);
            let slot = &mut best[entry.chunk.document];
            if slot.is_none_or(|s| score > s) {
                *slot = Some(score);
            }
        }

        let mut scored: Vec<ScoredDocument<'_>> = best
            .into_iter()
            .enumerate()
            .filter_map(|(i, score)| {
                score.map(|score| ScoredDocument {
                    document: &self.documents[i],
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::from(&IndexSettings::default())
    }
}

impl From<&IndexSettings> for IndexConfig {
    fn from(settings: &IndexSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            embedding_batch_size: settings.embedding_batch_size,
        }
    }
}

/// Builds and queries [`SimilarityIndex`]es with an [`EmbeddingProvider`].
#[derive(Clone)]
pub struct SemanticIndexer<E> {
    embedding: E,
    splitter: TextSplitter,
    batch_size: usize,
}

impl<E: EmbeddingProvider> SemanticIndexer<E> {
    pub fn new(embedding: E) -> Self {
        Self::with_config(embedding, IndexConfig::default())
    }

    pub fn with_config(embedding: E, config: IndexConfig) -> Self {
        Self {
            embedding,
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            batch_size: config.embedding_batch_size.max(1),
        }
    }

    pub async fn build(&self, documents: Vec<Document>) -> Result<SimilarityIndex, AppError> {
        self.build_with_progress(documents, &SilentReporter).await
    }

    /// Chunks and embeds every document. Any embedding failure aborts the build.
    pub async fn build_with_progress<R: ProgressReporter>(
        &self,
        documents: Vec<Document>,
        reporter: &R,
    ) -> Result<SimilarityIndex, AppError> {
        let start = Instant::now();

        let chunks: Vec<Chunk> = documents
            .iter()
            .enumerate()
            .flat_map(|(i, doc)| {
                self.splitter
                    .split(&doc.content)
                    .into_iter()
                    .map(move |text| Chunk { document: i, text })
            })
            .collect();

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedding.generate_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(AppError::MalformedResponse(format!(
                    "{} returned {} embeddings for {} inputs",
                    self.embedding.name(),
                    vectors.len(),
                    batch.len()
                )));
            }
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, embedding)| IndexEntry { chunk, embedding }),
            );
        }

        reporter.report(PipelineEvent::IndexBuilt {
            documents: documents.len(),
            chunks: entries.len(),
            elapsed: start.elapsed(),
        });

        Ok(SimilarityIndex { documents, entries })
    }

    /// Embeds `query` and returns the `k` most similar documents.
    pub async fn search<'a>(
        &self,
        index: &'a SimilarityIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument<'a>>, AppError> {
        if index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedding.generate(query).await?;
        Ok(index.nearest(&vector, k))
    }
}
