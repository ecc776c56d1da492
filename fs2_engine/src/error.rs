use fs2_formats::FormatError;
use thiserror::Error;

/// Failures surfaced by the runtime. None of these unwind playback: callers
/// log them and move on to the next record.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("asset '{0}' is not listed in the archive index")]
    NotFound(String),
    #[error("{class} index {index} is out of range (capacity {capacity})")]
    Index {
        class: &'static str,
        index: usize,
        capacity: usize,
    },
    #[error("codec failure: {0}")]
    Codec(String),
    #[error("fetching {path} failed: {reason}")]
    Fetch { path: String, reason: String },
    #[error("session snapshot: {0}")]
    Snapshot(String),
}

impl EngineError {
    pub(crate) fn fetch(path: &str, reason: impl ToString) -> Self {
        EngineError::Fetch {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn index(class: &'static str, index: usize, capacity: usize) -> Self {
        EngineError::Index {
            class,
            index,
            capacity,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
