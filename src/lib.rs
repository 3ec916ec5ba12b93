use thiserror::Error;

pub type Result<T> = std::result::Result<T, QaError>;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("No documents produced any chunks; nothing to serve")]
    EmptyCorpus,

    #[error("Index not ready")]
    IndexNotReady,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod answer;
pub mod completion;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod index;
pub mod loader;
pub(crate) mod net;
pub mod server;
