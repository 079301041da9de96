use thiserror::Error;

pub type Result<T> = std::result::Result<T, RaftError>;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persisted state failed to decode: {0}")]
    Corrupt(String),

    #[error("apply queue closed")]
    ApplyQueueClosed,
}
