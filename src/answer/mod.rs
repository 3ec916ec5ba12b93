
use std::sync::Arc;
use tracing::debug;

use crate::completion::CompletionClient;
use crate::corpus::Corpus;
use crate::embeddings::TextEncoder;
use crate::{QaError, Result};

/// Separator between retrieved chunks in the prompt context
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Composes answers: embed the question, retrieve the nearest chunks, and
/// hand question plus context to the completion service.
pub struct AnswerComposer {
    encoder: Arc<dyn TextEncoder>,
    completion: CompletionClient,
    top_k: usize,
}

impl AnswerComposer {
    #[inline]
    pub fn new(encoder: Arc<dyn TextEncoder>, completion: CompletionClient, top_k: usize) -> Self {
        Self {
            encoder,
            completion,
            top_k,
        }
    }

    /// Answer `question` against the given corpus. `None` means no corpus
    /// has been built yet, which is reported as [`QaError::IndexNotReady`]
    /// rather than attempting any external call.
    ///
    /// Blocking: performs embedding and completion calls.
    #[inline]
    pub fn answer(&self, corpus: Option<&Corpus>, question: &str) -> Result<String> {
        let corpus = corpus.ok_or(QaError::IndexNotReady)?;

        let retrieved = self.retrieve(corpus, question)?;
        let context = retrieved
            .iter()
            .map(|chunk| chunk.text)
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        debug!(
            "Retrieved {} chunks for question ({} chars of context)",
            retrieved.len(),
            context.len()
        );

        self.completion.complete(question, &context)
    }

    /// Retrieval without the completion call: the nearest chunk texts with
    /// their sources and distances, ascending.
    #[inline]
    pub fn retrieve<'c>(
        &self,
        corpus: &'c Corpus,
        question: &str,
    ) -> Result<Vec<RetrievedChunk<'c>>> {
        let query_vector = self.encoder.embed_query(question)?;
        let hits = corpus.index.search(&query_vector, self.top_k)?;

        // Positions beyond the chunk table would mean a stale index; drop
        // them instead of panicking on the lookup.
        Ok(hits
            .iter()
            .filter(|hit| hit.index < corpus.chunks.len())
            .map(|hit| RetrievedChunk {
                source: corpus.chunks[hit.index].source.as_str(),
                text: corpus.chunks[hit.index].text.as_str(),
                distance: hit.distance,
            })
            .collect())
    }
}

/// One retrieved chunk with its provenance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievedChunk<'c> {
    pub source: &'c str,
    pub text: &'c str,
    pub distance: f32,
}
