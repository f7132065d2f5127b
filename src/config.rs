use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::filter::DEFAULT_EXTENSIONS;
use crate::transform::ChainConfig;

/// How accepted items are scheduled.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One item at a time, in arrival order.
    #[default]
    Streaming,
    /// Buffer until end of input, then drain with a bounded worker pool.
    Batched,
}

/// What a failed item does to the rest of the run.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Continue,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub concurrency_limit: Option<usize>,
    pub extensions: Vec<String>,
    pub verbose: bool,
    pub mode: Mode,
    pub on_error: FailurePolicy,
    pub chain: ChainConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency_limit: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            verbose: false,
            mode: Mode::Streaming,
            on_error: FailurePolicy::Abort,
            chain: ChainConfig::default(),
        }
    }
}

impl Config {
    /// Worker bound for batched mode; host parallelism when unset, never zero.
    pub fn concurrency(&self) -> usize {
        self.concurrency_limit.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Verbose when either the config or the process arguments ask for it.
    pub fn effective_verbose(&self) -> bool {
        self.verbose || verbose_from_args(std::env::args())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p).with_context(|| format!("reading config {}", p.display()))?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let config: Config = serde_yaml::from_slice(&bytes).context("parsing config yaml")?;
    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig {
        config,
        config_hash,
    })
}

/// Process-wide `--verbose` flag detection.
pub fn verbose_from_args<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter().any(|arg| arg.as_ref() == "--verbose")
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_loads() {
        let loaded = load_config(None).expect("config");
        let cfg = loaded.config;
        assert_eq!(cfg.extensions, vec!["jpg", "jpeg", "png", "gif", "svg"]);
        assert_eq!(cfg.mode, Mode::Streaming);
        assert_eq!(cfg.on_error, FailurePolicy::Abort);
        assert_eq!(cfg.chain.png.optimization_level, 2);
        assert_eq!(cfg.chain.svg.plugins.len(), 4);
        assert_eq!(loaded.config_hash.len(), 64);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "mode: batched\nconcurrency_limit: 3\non_error: continue").expect("write");
        let cfg = load_config(Some(file.path())).expect("config").config;
        assert_eq!(cfg.mode, Mode::Batched);
        assert_eq!(cfg.on_error, FailurePolicy::Continue);
        assert_eq!(cfg.concurrency(), 3);
        assert_eq!(cfg.extensions.len(), 5);
        assert!(cfg.chain.jpeg.strip_metadata);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let cfg = Config {
            concurrency_limit: Some(0),
            ..Config::default()
        };
        assert_eq!(cfg.concurrency(), 1);
    }

    #[test]
    fn unset_concurrency_uses_host_parallelism() {
        assert_eq!(Config::default().concurrency(), num_cpus::get().max(1));
    }

    #[test]
    fn detects_verbose_flag() {
        assert!(verbose_from_args(["gulp", "build", "--verbose"]));
        assert!(!verbose_from_args(["gulp", "--verbose=false"]));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Some(Path::new("/nonexistent/imgshrink.yml"))).expect_err("missing");
        assert!(format!("{err:#}").contains("/nonexistent/imgshrink.yml"));
    }
}
