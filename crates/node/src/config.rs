//! Simulation Configuration

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use xchain_order::{ChainId, OrderConfig, TraceConfig, TraceMode};

/// Replay harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of participating sub-chains
    pub chains: u32,
    /// Blocks produced per sub-chain
    pub blocks_per_chain: i64,
    /// Independent order-manager replicas
    pub replicas: usize,
    /// How far behind the shared view a reporter may lag
    pub max_lag: usize,
    pub seed: u64,
    /// Committed cells kept per chain (None keeps everything)
    pub retention_window: Option<u64>,
    /// How long to wait for each replica's commits
    pub commit_timeout_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            chains: 3,
            blocks_per_chain: 100,
            replicas: 4,
            max_lag: 8,
            seed: 1,
            retention_window: None,
            commit_timeout_ms: 10_000,
        }
    }
}

impl SimConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading sim config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing sim config {}", path.display()))
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        (0..self.chains as ChainId).collect()
    }

    /// Always a shared-view trace: the harness checks replicas for an identical order
    pub fn trace_config(&self) -> TraceConfig {
        TraceConfig {
            chains: self.chain_ids(),
            blocks_per_chain: self.blocks_per_chain,
            max_lag: self.max_lag,
            seed: self.seed,
            mode: TraceMode::SharedView,
        }
    }

    pub fn order_config(&self) -> OrderConfig {
        OrderConfig {
            participants: self.chain_ids(),
            retention_window: self.retention_window,
        }
    }
}
