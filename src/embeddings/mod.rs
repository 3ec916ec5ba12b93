// Embedding pipeline: chunking plus the pluggable text encoders

pub mod chunking;
pub mod ollama;
pub mod openai;

pub use ollama::OllamaEncoder;
pub use openai::OpenAiEncoder;

use crate::config::{EmbeddingConfig, EncoderProvider};
use crate::{QaError, Result};

/// A text-to-vector encoder.
///
/// Corpus and query vectors must live in the same space: the same model,
/// the same dimension, and deterministic output for identical input within
/// one process lifetime.
pub trait TextEncoder: Send + Sync {
    /// Encode a batch of texts into fixed-dimension vectors, one per input,
    /// in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Encode a single live query in the same vector space as the corpus.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let batch = [text.to_string()];
        let mut vectors = self.embed_batch(&batch)?;
        vectors
            .pop()
            .ok_or_else(|| QaError::Embedding("encoder returned no vector for query".to_string()))
    }
}

/// Construct the configured encoder
#[inline]
pub fn build_encoder(config: &EmbeddingConfig) -> Result<Box<dyn TextEncoder>> {
    match config.provider {
        EncoderProvider::Ollama => Ok(Box::new(OllamaEncoder::new(&config.ollama)?)),
        EncoderProvider::OpenAi => Ok(Box::new(OpenAiEncoder::new(&config.openai)?)),
    }
}
