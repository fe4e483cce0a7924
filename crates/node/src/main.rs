//! Cross-chain order replay harness
//!
//! Generates synthetic decision traffic for N sub-chains, signs every vote,
//! and replays the signed log into several independent order-manager
//! replicas, each in its own shuffled arrival order. The run succeeds only
//! if every replica commits the identical global sequence.

use anyhow::{bail, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use xchain_order::DecisionTrace;

mod config;
mod replica;

use config::SimConfig;
use replica::{Replica, ReplicaReport};

/// Cross-chain order replay harness
#[derive(Parser, Debug)]
#[command(name = "xchain-sim")]
#[command(about = "Replay shuffled cross-chain order decisions into independent replicas", long_about = None)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of sub-chains
    #[arg(long)]
    chains: Option<u32>,

    /// Blocks produced per sub-chain
    #[arg(long)]
    blocks: Option<i64>,

    /// Number of replicas
    #[arg(long)]
    replicas: Option<usize>,

    /// Maximum reporter lag, in produced blocks
    #[arg(long)]
    max_lag: Option<usize>,

    /// Trace seed
    #[arg(long)]
    seed: Option<u64>,

    /// Committed cells kept per chain
    #[arg(long)]
    retention_window: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write a JSON report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Args {
    fn sim_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)?,
            None => SimConfig::default(),
        };
        if let Some(chains) = self.chains {
            config.chains = chains;
        }
        if let Some(blocks) = self.blocks {
            config.blocks_per_chain = blocks;
        }
        if let Some(replicas) = self.replicas {
            config.replicas = replicas;
        }
        if let Some(max_lag) = self.max_lag {
            config.max_lag = max_lag;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.retention_window.is_some() {
            config.retention_window = self.retention_window;
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
struct SimReport {
    config: SimConfig,
    expected_cells: usize,
    agreed: bool,
    replicas: Vec<ReplicaReport>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.sim_config()?;
    if config.chains == 0 || config.replicas == 0 {
        bail!("need at least one chain and one replica");
    }

    tracing::info!("Starting cross-chain order replay");
    tracing::info!("  Chains: {}", config.chains);
    tracing::info!("  Blocks per chain: {}", config.blocks_per_chain);
    tracing::info!("  Replicas: {}", config.replicas);
    tracing::info!("  Max lag: {}", config.max_lag);
    tracing::info!("  Seed: {}", config.seed);
    if let Some(window) = config.retention_window {
        tracing::info!("  Retention window: {} blocks", window);
    }

    tokio::select! {
        result = run(config) => {
            let report = result?;
            if let Some(path) = &args.report {
                std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
                tracing::info!("Report written to {}", path.display());
            }
            if !report.agreed {
                bail!("replicas disagreed on the commit order");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down...");
        }
    }

    Ok(())
}

async fn run(config: SimConfig) -> Result<SimReport> {
    let trace = Arc::new(DecisionTrace::generate(&config.trace_config())?);
    let signers = Arc::new(replica::signers(&config.chain_ids(), config.seed));
    tracing::info!(
        "Generated {} decisions for {} cells",
        trace.decisions().len(),
        trace.cell_count()
    );

    let handles: Vec<_> = (0..config.replicas)
        .map(|index| {
            let replica = Replica {
                index,
                arrival_seed: config.seed.wrapping_add(index as u64 + 1),
                config: config.order_config(),
                signers: signers.clone(),
                trace: trace.clone(),
                commit_timeout: Duration::from_millis(config.commit_timeout_ms),
            };
            tokio::spawn(replica.run())
        })
        .collect();

    let mut replicas = Vec::with_capacity(handles.len());
    for handle in handles {
        replicas.push(handle.await??);
    }

    let agreed = replicas
        .iter()
        .all(|r| r.matches_expected && r.order == replicas[0].order);

    for r in &replicas {
        tracing::info!(
            "Replica {}: {} applied, {} dropped, {} committed, {} pruned{}",
            r.replica,
            r.applied,
            r.dropped,
            r.committed,
            r.stats.cells_pruned,
            if r.matches_expected { "" } else { " (DIVERGED)" }
        );
    }
    if agreed {
        tracing::info!("All {} replicas committed the same {} cells", replicas.len(), trace.cell_count());
    } else {
        tracing::error!("Replicas disagree on the commit order");
    }

    Ok(SimReport {
        expected_cells: trace.cell_count(),
        config,
        agreed,
        replicas,
    })
}
