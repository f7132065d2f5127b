//! Shared test stages for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use imgshrink::config::{Config, FailurePolicy, Mode};
use imgshrink::{Item, Pipeline, StageError, Transform, TransformChain};

/// Maps input length to output length; unknown lengths pass through.
pub struct ShrinkTo {
    pub table: HashMap<usize, usize>,
}

impl ShrinkTo {
    pub fn new(pairs: &[(usize, usize)]) -> Self {
        Self {
            table: pairs.iter().copied().collect(),
        }
    }
}

impl Transform for ShrinkTo {
    fn name(&self) -> &str {
        "shrink"
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, StageError> {
        let len = self.table.get(&input.len()).copied().unwrap_or(input.len());
        let mut out = input.to_vec();
        out.resize(len, 0);
        Ok(out)
    }
}

/// Fails any payload starting with `FAIL`, panics on `PANIC`.
pub struct Tripwire;

impl Transform for Tripwire {
    fn name(&self) -> &str {
        "tripwire"
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, StageError> {
        if input.starts_with(b"PANIC") {
            panic!("tripwire panic");
        }
        if input.starts_with(b"FAIL") {
            return Err(StageError::Other("tripwire".to_string()));
        }
        Ok(input.to_vec())
    }
}

/// Sleeps for `payload[0]` milliseconds while tracking concurrent calls.
#[derive(Default)]
pub struct Probe {
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl Probe {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct ProbeStage(pub Arc<Probe>);

impl Transform for ProbeStage {
    fn name(&self) -> &str {
        "probe"
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, StageError> {
        let probe = &self.0;
        probe.calls.fetch_add(1, Ordering::SeqCst);
        let now = probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        probe.peak.fetch_max(now, Ordering::SeqCst);
        let millis = input.first().copied().unwrap_or(0) as u64;
        thread::sleep(Duration::from_millis(millis));
        probe.active.fetch_sub(1, Ordering::SeqCst);
        Ok(input.to_vec())
    }
}

pub fn config(mode: Mode, on_error: FailurePolicy, concurrency: usize) -> Config {
    Config {
        concurrency_limit: Some(concurrency),
        mode,
        on_error,
        ..Config::default()
    }
}

pub fn pipeline(cfg: Config, stages: Vec<Arc<dyn Transform>>) -> Pipeline {
    let mut chain = TransformChain::new();
    for stage in stages {
        chain.push(stage);
    }
    Pipeline::new(cfg, chain)
}

pub fn png(name: &str, size: usize) -> Item {
    Item::new(format!("{name}.png"), vec![7u8; size])
}

pub fn paths(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.path.display().to_string())
        .collect()
}
