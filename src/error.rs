use std::path::PathBuf;

use thiserror::Error;

/// Failure raised by a single transformation stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("unexpected eof")]
    Eof,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("streaming not supported: {}", path.display())]
    UnsupportedInput { path: PathBuf },
    #[error("stage {stage} failed for {}: {source}", path.display())]
    TransformFailure {
        path: PathBuf,
        stage: String,
        #[source]
        source: StageError,
    },
    #[error("worker panicked while processing {}", path.display())]
    WorkerPanicked { path: PathBuf },
    #[error("pipeline orchestration thread panicked")]
    EnginePanicked,
    #[error("pipeline already closed")]
    Closed,
    #[error("output channel closed")]
    ChannelClosed,
}

impl PipelineError {
    /// Path of the item the error is attributed to, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            PipelineError::UnsupportedInput { path }
            | PipelineError::TransformFailure { path, .. }
            | PipelineError::WorkerPanicked { path } => Some(path),
            PipelineError::EnginePanicked
            | PipelineError::Closed
            | PipelineError::ChannelClosed => None,
        }
    }
}
