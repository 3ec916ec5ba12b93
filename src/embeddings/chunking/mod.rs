
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A chunk of document text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk text
    pub text: String,
    /// Byte offset of the chunk start within the source text
    pub start: usize,
    /// Byte offset one past the chunk end within the source text
    pub end: usize,
}

/// Configuration for text chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub max_chars: usize,
    /// Overlap in characters between adjacent chunks (must be less than `max_chars`)
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chars: 1500,
            overlap_chars: 150,
        }
    }
}

/// Split text into fixed-size character windows with overlap.
///
/// Windows advance by `max_chars - overlap_chars` characters and are always
/// cut at `char` boundaries, so multi-byte text round-trips cleanly. Windows
/// split mid-sentence and mid-word; adjacent windows share the overlap
/// region, which is what retrieval relies on. Empty input produces no
/// chunks.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    if text.is_empty() {
        return chunks;
    }

    // Validated at config load; guard anyway so a bad caller can't loop forever.
    let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);

    let char_offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total_chars = char_offsets.len();

    let mut start_char = 0;
    loop {
        let end_char = (start_char + config.max_chars).min(total_chars);
        let start = char_offsets[start_char];
        let end = if end_char == total_chars {
            text.len()
        } else {
            char_offsets[end_char]
        };

        chunks.push(TextChunk {
            text: text[start..end].to_string(),
            start,
            end,
        });

        if end_char == total_chars {
            break;
        }
        start_char += step;
    }

    debug!(
        "Chunked {} chars into {} chunks (max {}, overlap {})",
        total_chars,
        chunks.len(),
        config.max_chars,
        config.overlap_chars
    );

    chunks
}
