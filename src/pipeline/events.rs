//! # Pipeline Events
//!
//! Everything a run delivers to its output boundary.

use crate::error::PipelineError;
use crate::item::Item;
use crate::stats::RunSummary;

#[derive(Debug)]
pub enum PipelineEvent {
    /// A transformed or passed-through item
    Item(Item),
    /// An item failed. Under `Continue` the run goes on; under `Abort` this
    /// reports a batched item that was already in flight when the run stopped.
    ItemFailed(PipelineError),
    /// Terminal: every item was resolved
    Completed(RunSummary),
    /// Terminal: the run stopped on the first failure
    Aborted(PipelineError),
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Completed(_) | PipelineEvent::Aborted(_))
    }
}
