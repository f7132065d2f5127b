//! # imgshrink
//!
//! Pipeline engine that filters in-memory file items by extension, runs the
//! eligible ones through an ordered chain of transformation stages, and
//! reports aggregate savings once the input is exhausted.

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod item;
pub mod logging;
pub mod pipeline;
pub mod stats;
pub mod transform;

pub use config::{Config, FailurePolicy, Mode};
pub use error::{PipelineError, StageError};
pub use item::{Contents, Item};
pub use pipeline::events::PipelineEvent;
pub use pipeline::{Pipeline, PipelineHandle, PipelineReport, PipelineState, RunOutcome};
pub use stats::{Aggregator, RunSummary};
pub use transform::{Transform, TransformChain};
