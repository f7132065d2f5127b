//! # Pipeline Module
//!
//! Orchestrates filtering, transform dispatch and run accounting.
//!
//! Two scheduling modes are supported:
//! - streaming: each accepted item is transformed inline, so output order
//!   matches input order exactly
//! - batched: accepted items are buffered until end of input, then drained by
//!   a pool of at most `concurrency` workers; transformed items are emitted in
//!   completion order while pass-through items keep arrival order

pub mod events;
pub mod workers;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use tracing::{debug, info, warn};

use crate::config::{Config, FailurePolicy, Mode};
use crate::constants::{CHANNEL_CAPACITY_MULTIPLIER, MIN_CHANNEL_CAPACITY};
use crate::error::PipelineError;
use crate::filter::ExtensionFilter;
use crate::item::Item;
use crate::stats::{Aggregator, RunSummary};
use crate::transform::{Transform, TransformChain, build_default_chain};

use events::PipelineEvent;
use workers::{PoolContext, WorkerResult};

/// Lifecycle of one pipeline instance. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Draining = 1,
    Finalizing = 2,
    Closed = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Idle,
            1 => PipelineState::Draining,
            2 => PipelineState::Finalizing,
            _ => PipelineState::Closed,
        }
    }
}

/// Atomic state shared between the engine and its handle.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(PipelineState::Idle as u8))
    }

    fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn advance(&self, next: PipelineState) -> Result<(), PipelineError> {
        let current = self.get();
        if current == PipelineState::Closed || next <= current {
            return Err(PipelineError::Closed);
        }
        self.0
            .compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| PipelineError::Closed)?;
        debug!("pipeline state {:?} -> {:?}", current, next);
        Ok(())
    }

    fn close(&self) {
        let previous = self.0.swap(PipelineState::Closed as u8, Ordering::AcqRel);
        if previous != PipelineState::Closed as u8 {
            debug!("pipeline state {:?} -> Closed", PipelineState::from_u8(previous));
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Stopped on a failure; the error was delivered as `PipelineEvent::Aborted`.
    Aborted,
}

impl RunOutcome {
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::Completed(summary) => Some(summary),
            RunOutcome::Aborted => None,
        }
    }
}

/// Everything a run produced, collected in emission order.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub items: Vec<Item>,
    pub failures: Vec<PipelineError>,
    pub summary: Option<RunSummary>,
    pub aborted: Option<PipelineError>,
}

/// A run executing on its own thread.
pub struct PipelineHandle {
    pub events: Receiver<PipelineEvent>,
    state: Arc<StateCell>,
    handle: thread::JoinHandle<Result<RunOutcome, PipelineError>>,
}

impl PipelineHandle {
    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Wait for the run to finish. Drain `events` first or the run may block.
    pub fn join(self) -> Result<RunOutcome, PipelineError> {
        self.handle
            .join()
            .unwrap_or(Err(PipelineError::EnginePanicked))
    }
}

/// Disposition of one arriving item.
enum Admission {
    PassThrough(Item),
    Unsupported(Item),
    Transform(Item),
}

pub struct Pipeline {
    config: Config,
    chain: Arc<TransformChain>,
    filter: ExtensionFilter,
    verbose: bool,
    aggregator: Arc<Aggregator>,
    state: Arc<StateCell>,
}

impl Pipeline {
    /// Build a pipeline around an explicit chain. The config is fixed from here on.
    pub fn new(config: Config, chain: TransformChain) -> Self {
        let verbose = config.effective_verbose();
        let filter = ExtensionFilter::new(&config.extensions, verbose);
        Self {
            config,
            chain: Arc::new(chain),
            filter,
            verbose,
            aggregator: Arc::new(Aggregator::new()),
            state: Arc::new(StateCell::new()),
        }
    }

    /// Build a pipeline with the default chain described by `config.chain`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let chain = build_default_chain(&config.chain)?;
        Ok(Self::new(config, chain))
    }

    /// Append a user-supplied stage after the existing chain.
    pub fn with_stage(mut self, stage: Arc<dyn Transform>) -> Self {
        Arc::make_mut(&mut self.chain).push(stage);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Run until `input` is exhausted (every sender dropped).
    ///
    /// Emits items and failures to `output`, then exactly one terminal event.
    pub fn run(
        self,
        input: Receiver<Item>,
        output: &Sender<PipelineEvent>,
    ) -> Result<RunOutcome, PipelineError> {
        self.state.advance(PipelineState::Draining)?;
        info!(
            "pipeline start mode={:?} concurrency={} stages={:?}",
            self.config.mode,
            self.config.concurrency(),
            self.chain.names()
        );

        let result = match self.config.mode {
            Mode::Streaming => self.run_streaming(input, output),
            Mode::Batched => self.run_batched(input, output),
        };
        let result = result.and_then(|failure| self.finalize(failure, output));
        self.state.close();
        result
    }

    /// Run on a dedicated thread, returning a handle with the event stream.
    pub fn spawn(self, input: Receiver<Item>) -> PipelineHandle {
        let cap = self
            .config
            .concurrency()
            .saturating_mul(CHANNEL_CAPACITY_MULTIPLIER)
            .max(MIN_CHANNEL_CAPACITY);
        let (tx, rx) = bounded(cap);
        let state = self.state.clone();
        let handle = thread::spawn(move || self.run(input, &tx));
        PipelineHandle {
            events: rx,
            state,
            handle,
        }
    }

    /// Feed `items` through the pipeline and collect everything it emits.
    pub fn process_all<I>(self, items: I) -> Result<PipelineReport, PipelineError>
    where
        I: IntoIterator<Item = Item>,
    {
        let (in_tx, in_rx) = unbounded();
        for item in items {
            in_tx.send(item).map_err(|_| PipelineError::ChannelClosed)?;
        }
        drop(in_tx);

        let (out_tx, out_rx) = unbounded();
        self.run(in_rx, &out_tx)?;
        drop(out_tx);

        let mut report = PipelineReport::default();
        for event in out_rx {
            match event {
                PipelineEvent::Item(item) => report.items.push(item),
                PipelineEvent::ItemFailed(err) => report.failures.push(err),
                PipelineEvent::Completed(summary) => report.summary = Some(summary),
                PipelineEvent::Aborted(err) => report.aborted = Some(err),
            }
        }
        Ok(report)
    }

    fn admit(&self, item: Item) -> Admission {
        if item.is_null() {
            return Admission::PassThrough(item);
        }
        if item.is_stream() {
            return Admission::Unsupported(item);
        }
        if !self.filter.accepts(&item) {
            return Admission::PassThrough(item);
        }
        Admission::Transform(item)
    }

    /// Report a failed item. Returns the error when the run must abort.
    fn fail(
        &self,
        err: PipelineError,
        output: &Sender<PipelineEvent>,
    ) -> Result<Option<PipelineError>, PipelineError> {
        warn!("{err}");
        match self.config.on_error {
            FailurePolicy::Abort => Ok(Some(err)),
            FailurePolicy::Continue => {
                emit(output, PipelineEvent::ItemFailed(err))?;
                Ok(None)
            }
        }
    }

    fn run_streaming(
        &self,
        input: Receiver<Item>,
        output: &Sender<PipelineEvent>,
    ) -> Result<Option<PipelineError>, PipelineError> {
        for item in input {
            let result = match self.admit(item) {
                Admission::PassThrough(item) => {
                    emit(output, PipelineEvent::Item(item))?;
                    continue;
                }
                Admission::Unsupported(item) => {
                    Err(PipelineError::UnsupportedInput { path: item.path })
                }
                Admission::Transform(item) => {
                    workers::process_item_guarded(item, &self.chain, self.verbose)
                }
            };

            match result {
                Ok(processed) => {
                    self.aggregator.apply(&processed.delta);
                    emit(output, PipelineEvent::Item(processed.item))?;
                }
                Err(err) => {
                    if let Some(fatal) = self.fail(err, output)? {
                        return Ok(Some(fatal));
                    }
                }
            }
        }
        Ok(None)
    }

    fn run_batched(
        &self,
        input: Receiver<Item>,
        output: &Sender<PipelineEvent>,
    ) -> Result<Option<PipelineError>, PipelineError> {
        let mut buffered = Vec::new();
        for item in input {
            match self.admit(item) {
                Admission::PassThrough(item) => emit(output, PipelineEvent::Item(item))?,
                Admission::Unsupported(item) => {
                    let err = PipelineError::UnsupportedInput { path: item.path };
                    if let Some(fatal) = self.fail(err, output)? {
                        return Ok(Some(fatal));
                    }
                }
                Admission::Transform(item) => buffered.push(item),
            }
        }
        self.drain(buffered, output)
    }

    /// Submit every buffered item to a bounded pool and forward results as
    /// they complete.
    fn drain(
        &self,
        buffered: Vec<Item>,
        output: &Sender<PipelineEvent>,
    ) -> Result<Option<PipelineError>, PipelineError> {
        if buffered.is_empty() {
            return Ok(None);
        }
        let workers = self.config.concurrency().min(buffered.len());
        debug!("draining {} buffered items with {} workers", buffered.len(), workers);

        let (job_tx, job_rx) = unbounded::<Item>();
        for item in buffered {
            job_tx.send(item).map_err(|_| PipelineError::ChannelClosed)?;
        }
        drop(job_tx);

        let mut ctx = PoolContext::new(self.chain.clone(), self.aggregator.clone(), self.verbose);
        ctx.halt_on_error = self.config.on_error == FailurePolicy::Abort;
        let (result_tx, result_rx) = unbounded::<WorkerResult>();
        let handles = workers::spawn_transform_workers(workers, &ctx, job_rx.clone(), result_tx);

        let mut fatal: Option<PipelineError> = None;
        let mut forward: Result<(), PipelineError> = Ok(());
        for result in result_rx {
            if forward.is_err() {
                continue;
            }
            forward = match result {
                Ok(processed) => emit(output, PipelineEvent::Item(processed.item)),
                Err(err) if fatal.is_some() => emit(output, PipelineEvent::ItemFailed(err)),
                Err(err) => match self.fail(err, output) {
                    Ok(Some(err)) => {
                        ctx.halt.store(true, Ordering::Release);
                        debug!("halting pool with {} chain(s) in flight", ctx.in_flight());
                        fatal = Some(err);
                        Ok(())
                    }
                    Ok(None) => Ok(()),
                    Err(err) => Err(err),
                },
            };
            if forward.is_err() {
                ctx.halt.store(true, Ordering::Release);
            }
        }

        for handle in handles {
            if handle.join().is_err() {
                warn!("transform worker exited abnormally");
            }
        }

        let skipped = ctx.dropped() + job_rx.try_iter().count();
        if skipped > 0 {
            warn!("{skipped} buffered item(s) not processed after abort");
        }

        forward.map(|_| fatal)
    }

    fn finalize(
        &self,
        failure: Option<PipelineError>,
        output: &Sender<PipelineEvent>,
    ) -> Result<RunOutcome, PipelineError> {
        self.state.advance(PipelineState::Finalizing)?;
        if let Some(err) = failure {
            warn!("pipeline aborted: {err}");
            emit(output, PipelineEvent::Aborted(err))?;
            return Ok(RunOutcome::Aborted);
        }

        let summary = self.aggregator.summary();
        info!("{}", summary.message());
        emit(output, PipelineEvent::Completed(summary))?;
        Ok(RunOutcome::Completed(summary))
    }
}

fn emit(output: &Sender<PipelineEvent>, event: PipelineEvent) -> Result<(), PipelineError> {
    output.send(event).map_err(|_| PipelineError::ChannelClosed)
}
