//! Order manager configuration

use crate::types::ChainId;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for an order manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Participating sub-chains; one decision per chain is required per block
    pub participants: Vec<ChainId>,
    /// Keep this many committed blocks per chain (None = keep everything)
    pub retention_window: Option<u64>,
}

impl OrderConfig {
    pub fn with_participants<I: IntoIterator<Item = ChainId>>(ids: I) -> Self {
        Self {
            participants: ids.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Load a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading order config {:?}", path))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing order config {:?}", path))?;
        tracing::info!("Loaded order config from {:?}", path);
        Ok(config)
    }
}
