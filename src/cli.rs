use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Files to minify
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory for minified files
    #[arg(short, long, default_value = "./minified")]
    pub output: PathBuf,

    /// Base directory used to compute output paths (defaults to the working directory)
    #[arg(long)]
    pub base: Option<PathBuf>,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Collect all inputs first, then minify them in parallel
    #[arg(long)]
    pub batched: bool,

    /// Maximum concurrent transforms in batched mode
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log skipped files and per-file savings
    #[arg(long)]
    pub verbose: bool,

    /// Keep going after a file fails instead of aborting the run
    #[arg(long)]
    pub continue_on_error: bool,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    pub summary_json: Option<PathBuf>,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
