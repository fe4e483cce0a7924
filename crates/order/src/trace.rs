//! Synthetic decision traffic for replay and soak runs
//!
//! Blocks are produced one at a time across chains in a random interleaving.
//!
//! With [`TraceMode::SharedView`] each block is stamped by an [`OrderAssigner`]
//! holding the shared view; the producing chain reports that stamp, and every
//! other chain reports the stamp of a block up to `max_lag` positions earlier.
//! The merged clocks therefore equal the shared stamps, which strictly
//! increase, so the commit order is exactly the production order.
//!
//! With [`TraceMode::PerReporter`] every reporter keeps its own view and learns
//! of each other chain's blocks after an independent lag. Merged clocks only
//! ever name earlier-produced blocks, so the traffic is cycle-free, but two
//! cells may end up with concurrent clocks.

use crate::assigner::OrderAssigner;
use crate::error::SequenceViolation;
use crate::types::{BlockNumber, CellId, ChainId};
use crate::vector_clock::VectorClock;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where reporters take their decisions from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    /// One assigner stamps every block
    #[default]
    SharedView,
    /// Each reporter stamps from its own lagging view
    PerReporter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    pub chains: Vec<ChainId>,
    pub blocks_per_chain: BlockNumber,
    /// How many blocks behind the producer a reporter may be
    pub max_lag: usize,
    pub seed: u64,
    #[serde(default)]
    pub mode: TraceMode,
}

/// One reporter's decision about one cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedDecision {
    pub reporter: ChainId,
    pub cell: CellId,
    pub decision: VectorClock,
}

#[derive(Debug, Clone)]
pub struct DecisionTrace {
    decisions: Vec<TracedDecision>,
    expected_order: Vec<CellId>,
}

impl DecisionTrace {
    pub fn generate(config: &TraceConfig) -> Result<Self, SequenceViolation> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let assigner = OrderAssigner::new(config.chains.iter().copied());
        let mut next: BTreeMap<ChainId, BlockNumber> = config.chains.iter().map(|c| (*c, 0)).collect();

        let mut stamps: Vec<VectorClock> = Vec::new();
        let mut views: BTreeMap<ChainId, VectorClock> = config
            .chains
            .iter()
            .map(|c| (*c, VectorClock::from_participants(config.chains.iter().copied())))
            .collect();
        let mut positions: BTreeMap<ChainId, Vec<usize>> =
            config.chains.iter().map(|c| (*c, Vec::new())).collect();
        let mut decisions = Vec::new();
        let mut expected_order = Vec::new();

        loop {
            let open: Vec<ChainId> = next
                .iter()
                .filter(|(_, b)| **b < config.blocks_per_chain)
                .map(|(c, _)| *c)
                .collect();
            let Some(chain) = open.choose(&mut rng).copied() else {
                break;
            };
            let block = next[&chain];
            next.insert(chain, block + 1);

            let pos = expected_order.len();
            let cell = CellId::new(chain, block);

            match config.mode {
                TraceMode::SharedView => {
                    stamps.push(assigner.get_block_order(chain, block)?);
                    for reporter in &config.chains {
                        let lag = if *reporter == chain { 0 } else { rng.gen_range(0..=config.max_lag) };
                        decisions.push(TracedDecision {
                            reporter: *reporter,
                            cell,
                            decision: stamps[pos.saturating_sub(lag)].clone(),
                        });
                    }
                }
                TraceMode::PerReporter => {
                    for (reporter, view) in views.iter_mut() {
                        for (other, produced) in &positions {
                            if *other == chain {
                                continue;
                            }
                            let lag = if other == reporter { 0 } else { rng.gen_range(0..=config.max_lag) };
                            let horizon = pos.saturating_sub(lag);
                            let seen = produced.partition_point(|p| *p < horizon) as BlockNumber - 1;
                            if view.get(*other).is_some_and(|known| known < seen) {
                                view.set(*other, seen);
                            }
                        }
                        view.set(chain, block - 1);
                        decisions.push(TracedDecision {
                            reporter: *reporter,
                            cell,
                            decision: view.clone(),
                        });
                    }
                }
            }

            if let Some(produced) = positions.get_mut(&chain) {
                produced.push(pos);
            }
            expected_order.push(cell);
        }

        Ok(Self {
            decisions,
            expected_order,
        })
    }

    /// Decisions in production order
    pub fn decisions(&self) -> &[TracedDecision] {
        &self.decisions
    }

    /// Decisions in a seeded random arrival order
    pub fn shuffled(&self, seed: u64) -> Vec<TracedDecision> {
        let mut decisions = self.decisions.clone();
        decisions.shuffle(&mut StdRng::seed_from_u64(seed));
        decisions
    }

    /// Production order. Under [`TraceMode::SharedView`] this is the order
    /// every replica must commit in; under [`TraceMode::PerReporter`] it is
    /// only one order consistent with the merged clocks.
    pub fn expected_order(&self) -> &[CellId] {
        &self.expected_order
    }

    pub fn cell_count(&self) -> usize {
        self.expected_order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> TraceConfig {
        TraceConfig {
            chains: vec![0, 1, 2],
            blocks_per_chain: 5,
            max_lag: 3,
            seed,
            mode: TraceMode::SharedView,
        }
    }

    fn merged(trace: &DecisionTrace) -> Vec<(CellId, VectorClock)> {
        trace
            .expected_order()
            .iter()
            .map(|cell| {
                let clock = VectorClock::merge_max(
                    trace.decisions().iter().filter(|d| d.cell == *cell).map(|d| &d.decision),
                )
                .unwrap();
                (*cell, clock)
            })
            .collect()
    }

    #[test]
    fn test_shape() {
        let trace = DecisionTrace::generate(&config(1)).unwrap();
        assert_eq!(trace.cell_count(), 15);
        assert_eq!(trace.decisions().len(), 45);

        // per-chain blocks appear in order
        for chain in 0..3 {
            let blocks: Vec<_> = trace
                .expected_order()
                .iter()
                .filter(|c| c.chain_id == chain)
                .map(|c| c.block_number)
                .collect();
            assert_eq!(blocks, (0..5).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_same_seed_same_trace() {
        let a = DecisionTrace::generate(&config(9)).unwrap();
        let b = DecisionTrace::generate(&config(9)).unwrap();
        assert_eq!(a.decisions(), b.decisions());
        assert_eq!(a.shuffled(4), b.shuffled(4));
    }

    #[test]
    fn test_per_reporter_clocks_name_earlier_blocks() {
        let mut found_concurrent = false;
        for seed in 0..6 {
            let trace = DecisionTrace::generate(&TraceConfig {
                blocks_per_chain: 8,
                mode: TraceMode::PerReporter,
                ..config(seed)
            })
            .unwrap();
            assert_eq!(trace.decisions().len(), 72);

            let merged = merged(&trace);
            for (pos, (cell, clock)) in merged.iter().enumerate() {
                assert_eq!(clock.get(cell.chain_id), Some(cell.block_number - 1));
                for (chain, block) in clock.iter().filter(|(_, b)| *b >= 0) {
                    let referenced = merged.iter().position(|(c, _)| *c == CellId::new(chain, block)).unwrap();
                    assert!(referenced < pos, "{} names later block ({}, {})", cell, chain, block);
                }
            }
            found_concurrent |= merged.iter().enumerate().any(|(i, (_, a))| {
                merged[i + 1..].iter().any(|(_, b)| a.causal_cmp(b).is_none())
            });
        }
        assert!(found_concurrent);
    }
}
