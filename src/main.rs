use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use imgshrink::config::{FailurePolicy, Mode};
use imgshrink::{Item, Pipeline, PipelineEvent, RunOutcome, cli, config, logging};

fn main() -> Result<()> {
    let cli_opts = cli::parse();
    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let mut cfg = loaded.config;
    if cli_opts.verbose {
        cfg.verbose = true;
    }
    if cli_opts.batched {
        cfg.mode = Mode::Batched;
    }
    if let Some(workers) = cli_opts.workers {
        cfg.concurrency_limit = Some(workers);
    }
    if cli_opts.continue_on_error {
        cfg.on_error = FailurePolicy::Continue;
    }
    logging::init_logging(cfg.effective_verbose());

    let base = match cli_opts.base.clone() {
        Some(base) => base,
        None => std::env::current_dir().context("resolving working directory")?,
    };
    std::fs::create_dir_all(&cli_opts.output)
        .with_context(|| format!("creating output dir {}", cli_opts.output.display()))?;

    info!(
        "starting inputs={} output={} mode={:?} config_hash={}",
        cli_opts.inputs.len(),
        cli_opts.output.display(),
        cfg.mode,
        loaded.config_hash
    );

    let pipeline = Pipeline::from_config(cfg)?;
    let (input_tx, input_rx) = crossbeam_channel::bounded::<Item>(16);
    let handle = pipeline.spawn(input_rx);

    let inputs = cli_opts.inputs.clone();
    let reader_base = base.clone();
    let reader = thread::spawn(move || -> Result<()> {
        for path in inputs {
            let absolute = if path.is_absolute() {
                path
            } else {
                reader_base.join(path)
            };
            let bytes = std::fs::read(&absolute)
                .with_context(|| format!("reading {}", absolute.display()))?;
            let item = Item::new(absolute, bytes).with_base(reader_base.clone());
            if input_tx.send(item).is_err() {
                // the pipeline stopped admitting items
                break;
            }
        }
        Ok(())
    });

    let mut failures = 0usize;
    let mut aborted = false;
    for event in handle.events.iter() {
        match event {
            PipelineEvent::Item(item) => write_item(&cli_opts.output, &item)?,
            PipelineEvent::ItemFailed(err) => {
                failures += 1;
                warn!("{err}");
            }
            PipelineEvent::Completed(summary) => {
                if let Some(path) = &cli_opts.summary_json {
                    let json = serde_json::to_vec_pretty(&summary)?;
                    std::fs::write(path, json)
                        .with_context(|| format!("writing summary {}", path.display()))?;
                }
            }
            PipelineEvent::Aborted(_) => aborted = true,
        }
    }

    let outcome = handle.join()?;
    match reader.join() {
        Ok(result) => result?,
        Err(_) => bail!("input reader thread panicked"),
    }

    if aborted || matches!(outcome, RunOutcome::Aborted) {
        bail!("run aborted");
    }
    if failures > 0 {
        bail!("{failures} file(s) failed");
    }
    Ok(())
}

fn write_item(root: &Path, item: &Item) -> Result<()> {
    let Some(bytes) = item.buffer() else {
        return Ok(());
    };
    let dest = output_path(root, item);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&dest, bytes).with_context(|| format!("writing {}", dest.display()))
}

fn output_path(root: &Path, item: &Item) -> PathBuf {
    let relative = item.relative();
    if relative.is_absolute() {
        root.join(relative.file_name().unwrap_or(relative.as_os_str()))
    } else {
        root.join(relative)
    }
}
