//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Media error: {0}")]
    Media(#[from] vedit_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
