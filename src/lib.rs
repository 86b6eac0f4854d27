use thiserror::Error;

pub type Result<T> = std::result::Result<T, CorpusError>;

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Library error: {0}")]
    Library(String),

    #[error(transparent)]
    Embedding(#[from] embeddings::EmbeddingError),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for CorpusError {
    #[inline]
    fn from(error: config::ConfigError) -> Self {
        CorpusError::Config(error.to_string())
    }
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod library;
pub mod search;
pub mod store;
pub mod vecmath;
