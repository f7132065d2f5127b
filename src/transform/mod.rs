//! # Transform Chain
//!
//! Pluggable payload transformations applied in order to one item.
//! Built-in stages are lossless and leave payloads of other formats untouched.

pub mod gif;
pub mod jpeg;
pub mod png;
pub mod svg;

use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;

use crate::error::StageError;

/// One transformation stage. Stages must not keep cross-item state.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;
    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, StageError>;
}

/// Per-stage options for the default chain.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ChainConfig {
    pub gif: gif::GifOptions,
    pub jpeg: jpeg::JpegOptions,
    pub png: png::PngOptions,
    pub svg: svg::SvgOptions,
}

/// Failure of one stage, tagged with the stage name.
#[derive(Debug)]
pub struct ChainFailure {
    pub stage: String,
    pub error: StageError,
}

#[derive(Clone, Default)]
pub struct TransformChain {
    stages: Vec<Arc<dyn Transform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Arc<dyn Transform>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order; each output feeds the next stage.
    pub fn run(&self, input: &[u8]) -> Result<Vec<u8>, ChainFailure> {
        let mut current = input.to_vec();
        for stage in &self.stages {
            current = stage.transform(&current).map_err(|error| ChainFailure {
                stage: stage.name().to_string(),
                error,
            })?;
        }
        Ok(current)
    }
}

impl std::fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformChain")
            .field("stages", &self.names())
            .finish()
    }
}

/// Build gif -> jpeg -> png -> svg from the chain options.
pub fn build_default_chain(cfg: &ChainConfig) -> Result<TransformChain> {
    let mut chain = TransformChain::new();
    chain.push(Arc::new(gif::GifTransform::new(cfg.gif.clone())));
    chain.push(Arc::new(jpeg::JpegTransform::new(cfg.jpeg.clone())));
    chain.push(Arc::new(png::PngTransform::new(cfg.png.clone())));
    chain.push(Arc::new(svg::SvgTransform::new(&cfg.svg)?));
    Ok(chain)
}

/// Bounds-checked cursor over a payload.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn read_exact(&mut self, len: usize) -> Result<&'a [u8], StageError> {
        let end = self.pos.checked_add(len).ok_or(StageError::Eof)?;
        if end > self.data.len() {
            return Err(StageError::Eof);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, StageError> {
        Ok(self.read_exact(1)?[0])
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.data[start..end]
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}
