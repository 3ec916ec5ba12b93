#[cfg(test)]
mod tests;

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::Config;
use crate::embeddings::TextEncoder;
use crate::embeddings::chunking::chunk_text;
use crate::index::VectorIndex;
use crate::loader::{LoadedDocument, load_documents};
use crate::{QaError, Result};

/// A chunk tied to the document it was cut from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusChunk {
    /// Source file of the parent document
    pub source: String,
    /// Chunk text
    pub text: String,
    /// Byte offsets within the parent document's extracted text
    pub start: usize,
    pub end: usize,
}

/// Statistics from one corpus build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub documents_loaded: usize,
    pub chunks_created: usize,
    pub vector_dimension: usize,
}

/// Read-only corpus state: the loaded documents, their chunks in global
/// insertion order, and the vector index aligned with that order.
///
/// A `Corpus` is immutable once built. Refreshing the corpus means building
/// a new one and swapping it into the [`SharedCorpus`] handle.
pub struct Corpus {
    pub documents: Vec<LoadedDocument>,
    pub chunks: Vec<CorpusChunk>,
    pub index: VectorIndex,
    pub stats: BuildStats,
}

/// Run the full startup pipeline: load -> chunk -> embed -> index.
///
/// Blocking: performs file IO and embedding calls. Callers on an async
/// runtime should wrap this in `spawn_blocking`.
#[inline]
pub fn build_corpus(config: &Config, encoder: &dyn TextEncoder) -> Result<Corpus> {
    let documents = load_documents(&config.documents.dir)?;

    let mut chunks = Vec::new();
    for document in &documents {
        for chunk in chunk_text(&document.text, &config.chunking) {
            chunks.push(CorpusChunk {
                source: document.source.clone(),
                text: chunk.text,
                start: chunk.start,
                end: chunk.end,
            });
        }
    }

    if chunks.is_empty() {
        return Err(QaError::EmptyCorpus);
    }

    debug!(
        "Embedding {} chunks from {} documents",
        chunks.len(),
        documents.len()
    );

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let vectors = encoder.embed_batch(&texts)?;

    if vectors.len() != chunks.len() {
        return Err(QaError::Embedding(format!(
            "Encoder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    let index = VectorIndex::build(&vectors)?;

    let stats = BuildStats {
        documents_loaded: documents.len(),
        chunks_created: chunks.len(),
        vector_dimension: index.dimension(),
    };

    info!(
        "Corpus ready: {} documents, {} chunks, dimension {}",
        stats.documents_loaded, stats.chunks_created, stats.vector_dimension
    );

    Ok(Corpus {
        documents,
        chunks,
        index,
        stats,
    })
}

/// Shared handle to the current corpus.
///
/// Readers clone the inner `Arc` out of the lock and never hold the lock
/// while working, so a rebuild can swap in a fresh corpus without in-flight
/// queries observing a partially-built index.
#[derive(Clone, Default)]
pub struct SharedCorpus {
    inner: Arc<RwLock<Option<Arc<Corpus>>>>,
}

impl SharedCorpus {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current corpus, or `None` before the first successful build
    #[inline]
    pub async fn get(&self) -> Option<Arc<Corpus>> {
        self.inner.read().await.clone()
    }

    /// Atomically swap in a freshly built corpus
    #[inline]
    pub async fn replace(&self, corpus: Corpus) {
        let mut guard = self.inner.write().await;
        *guard = Some(Arc::new(corpus));
    }
}
