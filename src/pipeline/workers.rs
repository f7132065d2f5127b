//! # Pipeline Workers
//!
//! Per-item transform work and the bounded worker pool used by batched runs.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::item::{Contents, Item};
use crate::stats::{Aggregator, ItemDelta};
use crate::transform::TransformChain;

/// An item that went through the chain, with its size change.
#[derive(Debug)]
pub struct Processed {
    pub item: Item,
    pub delta: ItemDelta,
}

pub type WorkerResult = Result<Processed, PipelineError>;

/// Run the chain over one item's payload.
///
/// Does not touch the running totals; the caller applies `delta`.
pub fn process_item(
    mut item: Item,
    chain: &TransformChain,
    verbose: bool,
) -> Result<Processed, PipelineError> {
    let original = match &item.contents {
        Contents::Buffer(buf) => buf,
        Contents::Stream(_) | Contents::Null => {
            return Err(PipelineError::UnsupportedInput { path: item.path });
        }
    };

    let optimized = chain
        .run(original)
        .map_err(|failure| PipelineError::TransformFailure {
            path: item.path.clone(),
            stage: failure.stage,
            source: failure.error,
        })?;

    let delta = ItemDelta::new(original.len() as u64, optimized.len() as u64);
    if verbose {
        info!("✔ {} ({})", item.relative().display(), delta.message());
    }
    item.contents = Contents::Buffer(optimized);
    Ok(Processed { item, delta })
}

/// `process_item` with a panicking stage reported as `WorkerPanicked`.
pub fn process_item_guarded(item: Item, chain: &TransformChain, verbose: bool) -> WorkerResult {
    let path = item.path.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| process_item(item, chain, verbose))) {
        Ok(result) => result,
        Err(_) => {
            warn!("stage panicked on {}", path.display());
            Err(PipelineError::WorkerPanicked { path })
        }
    }
}

/// Shared state of one batched drain.
pub struct PoolContext {
    pub chain: Arc<TransformChain>,
    pub aggregator: Arc<Aggregator>,
    pub verbose: bool,
    /// Set once the run aborts; workers stop taking jobs.
    pub halt: Arc<AtomicBool>,
    /// Raise `halt` as soon as any item fails.
    pub halt_on_error: bool,
    /// Number of chains currently executing.
    pub in_flight: Arc<AtomicUsize>,
    /// Jobs a worker took off the queue after `halt` and dropped.
    pub dropped: Arc<AtomicUsize>,
}

impl PoolContext {
    pub fn new(chain: Arc<TransformChain>, aggregator: Arc<Aggregator>, verbose: bool) -> Self {
        Self {
            chain,
            aggregator,
            verbose,
            halt: Arc::new(AtomicBool::new(false)),
            halt_on_error: false,
            in_flight: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Acquire)
    }
}

/// Spawn transform worker threads draining `rx`.
///
/// At most `workers` chains run at once. Successful items are accounted
/// before they are sent, so totals are complete once every worker exits.
pub fn spawn_transform_workers(
    workers: usize,
    ctx: &PoolContext,
    rx: Receiver<Item>,
    result_tx: Sender<WorkerResult>,
) -> Vec<thread::JoinHandle<()>> {
    let mut handles = Vec::new();
    let worker_count = workers.max(1);

    for id in 0..worker_count {
        let rx = rx.clone();
        let result_tx = result_tx.clone();
        let chain = ctx.chain.clone();
        let aggregator = ctx.aggregator.clone();
        let halt = ctx.halt.clone();
        let in_flight = ctx.in_flight.clone();
        let dropped = ctx.dropped.clone();
        let verbose = ctx.verbose;
        let halt_on_error = ctx.halt_on_error;

        handles.push(thread::spawn(move || {
            while !halt.load(Ordering::Acquire) {
                let Ok(item) = rx.recv() else {
                    break;
                };
                if halt.load(Ordering::Acquire) {
                    debug!("worker {id} halted; dropping queued job {}", item.path.display());
                    dropped.fetch_add(1, Ordering::AcqRel);
                    break;
                }
                debug!("worker {id} processing {}", item.path.display());

                in_flight.fetch_add(1, Ordering::AcqRel);
                let result = process_item_guarded(item, &chain, verbose);
                in_flight.fetch_sub(1, Ordering::AcqRel);

                if let Ok(processed) = &result {
                    aggregator.apply(&processed.delta);
                }
                if result.is_err() && halt_on_error {
                    halt.store(true, Ordering::Release);
                }
                if let Err(err) = result_tx.send(result) {
                    warn!("result channel closed while sending item: {err}");
                    break;
                }
            }
        }));
    }

    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::transform::Transform;

    struct Halve;

    impl Transform for Halve {
        fn name(&self) -> &str {
            "halve"
        }

        fn transform(&self, input: &[u8]) -> Result<Vec<u8>, StageError> {
            Ok(input[..input.len() / 2].to_vec())
        }
    }

    fn halving_chain() -> TransformChain {
        let mut chain = TransformChain::new();
        chain.push(Arc::new(Halve));
        chain
    }

    #[test]
    fn process_item_replaces_payload_and_reports_delta() {
        let processed =
            process_item(Item::new("a.png", vec![0; 100]), &halving_chain(), false).expect("ok");
        assert_eq!(processed.item.size(), 50);
        assert_eq!(processed.delta, ItemDelta::new(100, 50));
    }

    #[test]
    fn stream_item_is_unsupported() {
        let item = Item::stream("a.png", Box::new(std::io::empty()));
        let err = process_item(item, &halving_chain(), false).expect_err("unsupported");
        assert!(matches!(err, PipelineError::UnsupportedInput { .. }));
    }

    #[test]
    fn empty_payload_has_zero_percent() {
        let processed =
            process_item(Item::new("a.png", Vec::new()), &halving_chain(), true).expect("ok");
        assert_eq!(processed.delta.percent(), 0.0);
    }

    #[test]
    fn pool_processes_every_job_once() {
        let ctx = PoolContext::new(
            Arc::new(halving_chain()),
            Arc::new(Aggregator::new()),
            false,
        );
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        for i in 0..20 {
            job_tx.send(Item::new(format!("{i}.png"), vec![0; 10])).expect("send");
        }
        drop(job_tx);

        let handles = spawn_transform_workers(3, &ctx, job_rx, result_tx);
        for handle in handles {
            handle.join().expect("join");
        }
        let results: Vec<WorkerResult> = result_rx.iter().collect();
        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|r| r.is_ok()));
        let totals = ctx.aggregator.totals();
        assert_eq!(totals.item_count, 20);
        assert_eq!(totals.bytes_saved, 100);
        assert_eq!(ctx.in_flight(), 0);
        assert_eq!(ctx.dropped(), 0);
    }

    #[test]
    fn halted_pool_takes_no_jobs() {
        let ctx = PoolContext::new(
            Arc::new(halving_chain()),
            Arc::new(Aggregator::new()),
            false,
        );
        ctx.halt.store(true, Ordering::Release);
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        job_tx.send(Item::new("a.png", vec![0; 10])).expect("send");
        drop(job_tx);

        for handle in spawn_transform_workers(2, &ctx, job_rx, result_tx) {
            handle.join().expect("join");
        }
        assert_eq!(result_rx.iter().count(), 0);
        assert_eq!(ctx.aggregator.totals().item_count, 0);
    }

    #[test]
    fn halt_mid_drain_accounts_for_every_job() {
        let mut ctx = PoolContext::new(
            Arc::new(halving_chain()),
            Arc::new(Aggregator::new()),
            false,
        );
        ctx.halt_on_error = true;
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        job_tx
            .send(Item::stream("first.png", Box::new(std::io::empty())))
            .expect("send");
        for i in 0..9 {
            job_tx.send(Item::new(format!("{i}.png"), vec![0; 10])).expect("send");
        }
        drop(job_tx);

        for handle in spawn_transform_workers(1, &ctx, job_rx.clone(), result_tx) {
            handle.join().expect("join");
        }
        let results: Vec<WorkerResult> = result_rx.iter().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
        let left = job_rx.try_iter().count();
        assert_eq!(ctx.dropped() + left, 9);
    }

    #[test]
    fn guarded_processing_reports_panics() {
        struct Explode;
        impl Transform for Explode {
            fn name(&self) -> &str {
                "explode"
            }
            fn transform(&self, _input: &[u8]) -> Result<Vec<u8>, StageError> {
                panic!("stage blew up");
            }
        }
        let mut chain = TransformChain::new();
        chain.push(Arc::new(Explode));
        let err = process_item_guarded(Item::new("a.png", vec![1]), &chain, false)
            .expect_err("panic reported");
        assert!(matches!(err, PipelineError::WorkerPanicked { .. }));
        assert_eq!(err.path(), Some(std::path::Path::new("a.png")));
    }
}
