//! facematch - near-duplicate fingerprint classification service.

mod config;
mod handlers;
mod server;
mod ws;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Classify face fingerprints against confirmed matches, manage the
/// matched/unmatched sets, and relay change notifications over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "facematch")]
#[command(about = "Fingerprint near-duplicate classification service")]
#[command(version)]
struct Args {
    /// Config file (YAML or JSON)
    #[arg(long, env = "FACEMATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (e.g. :5000 or 127.0.0.1:5000)
    #[arg(long, env = "FACEMATCH_ADDR")]
    addr: Option<String>,

    /// Embedding dimension
    #[arg(long, env = "FACEMATCH_DIM")]
    dim: Option<usize>,

    /// Similarity a query must exceed to count as matched
    #[arg(long, env = "FACEMATCH_THRESHOLD")]
    threshold: Option<f32>,

    /// Candidates explored by the nearest-neighbor search
    #[arg(long, env = "FACEMATCH_NUM_CANDIDATES")]
    num_candidates: Option<usize>,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, cfg: &mut Config) {
        if let Some(addr) = &self.addr {
            cfg.addr = addr.clone();
        }
        if let Some(dim) = self.dim {
            cfg.dim = dim;
        }
        if let Some(threshold) = self.threshold {
            cfg.classifier.threshold = threshold;
        }
        if let Some(n) = self.num_candidates {
            cfg.classifier.num_candidates = n;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.apply(&mut cfg);
    cfg.validate()?;

    server::serve(cfg).await
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
