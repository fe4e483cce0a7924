//! One order-manager replica fed from a shuffled copy of the signed log

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use xchain_order::{
    commit_channel, BlockOrderVote, CellId, ChainId, DecisionIngress, DecisionTrace, Ed25519Verifier,
    LogCallbacks, OrderConfig, OrderManager, OrderStats, VoteSigner,
};

/// Deterministic signing key per reporter
pub fn signers(chains: &[ChainId], seed: u64) -> Vec<VoteSigner> {
    chains
        .iter()
        .map(|chain| {
            let mut key = [0u8; 32];
            StdRng::seed_from_u64(seed ^ (*chain as u64).rotate_left(32)).fill(&mut key);
            VoteSigner::from_seed(*chain, key)
        })
        .collect()
}

/// Signed log entries in the arrival order one replica sees
pub fn signed_entries(trace: &DecisionTrace, signers: &[VoteSigner], arrival_seed: u64) -> Vec<Vec<u8>> {
    trace
        .shuffled(arrival_seed)
        .into_iter()
        .filter_map(|d| {
            let signer = signers.iter().find(|s| s.reporter() == d.reporter)?;
            let vote = BlockOrderVote::new(d.cell.chain_id, d.cell.block_number, d.decision);
            Some(signer.sign(vote).to_bytes())
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicaReport {
    pub replica: usize,
    pub arrival_seed: u64,
    pub applied: u64,
    pub dropped: u64,
    pub committed: usize,
    pub matches_expected: bool,
    pub stats: OrderStats,
    #[serde(skip)]
    pub order: Vec<CellId>,
}

pub struct Replica {
    pub index: usize,
    pub arrival_seed: u64,
    pub config: OrderConfig,
    pub signers: Arc<Vec<VoteSigner>>,
    pub trace: Arc<DecisionTrace>,
    pub commit_timeout: Duration,
}

impl Replica {
    pub async fn run(self) -> anyhow::Result<ReplicaReport> {
        let (sink, stream) = commit_channel();
        let manager = Arc::new(OrderManager::new(&self.config, sink));

        let mut verifier = Ed25519Verifier::new();
        for signer in self.signers.iter() {
            verifier.register(signer.reporter(), signer.verifying_key());
        }
        let ingress = DecisionIngress::new(manager.clone(), verifier);
        ingress.on_leader_start(1);

        let entries = signed_entries(&self.trace, &self.signers, self.arrival_seed);
        tracing::info!(
            "Replica {} applying {} entries (arrival seed {})",
            self.index,
            entries.len(),
            self.arrival_seed
        );

        for (i, entry) in entries.iter().enumerate() {
            // failures are counted and logged by the ingress
            let _ = ingress.on_apply(entry);
            if i % 256 == 0 {
                tokio::task::yield_now().await;
            }
        }
        ingress.on_leader_stop();

        let expected = self.trace.cell_count();
        let timeout = self.commit_timeout;
        let committed = tokio::task::spawn_blocking(move || stream.collect(expected, timeout)).await?;
        let order: Vec<CellId> = committed.iter().map(|c| c.id).collect();

        if order.len() < expected {
            tracing::warn!(
                "Replica {} committed {} of {} cells before timeout",
                self.index,
                order.len(),
                expected
            );
        }

        Ok(ReplicaReport {
            replica: self.index,
            arrival_seed: self.arrival_seed,
            applied: ingress.applied(),
            dropped: ingress.dropped(),
            committed: order.len(),
            matches_expected: order.as_slice() == self.trace.expected_order(),
            stats: manager.stats(),
            order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xchain_order::{TraceConfig, TraceMode};

    fn trace() -> Arc<DecisionTrace> {
        Arc::new(
            DecisionTrace::generate(&TraceConfig {
                chains: vec![0, 1, 2],
                blocks_per_chain: 10,
                max_lag: 4,
                seed: 2,
                mode: TraceMode::SharedView,
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_signers_are_deterministic() {
        let a = signers(&[0, 1], 7);
        let b = signers(&[0, 1], 7);
        assert_eq!(a[1].verifying_key(), b[1].verifying_key());
        assert_ne!(a[0].verifying_key(), a[1].verifying_key());
    }

    #[tokio::test]
    async fn test_replica_commits_expected_order() {
        let replica = Replica {
            index: 0,
            arrival_seed: 5,
            config: OrderConfig::with_participants([0, 1, 2]),
            signers: Arc::new(signers(&[0, 1, 2], 3)),
            trace: trace(),
            commit_timeout: Duration::from_secs(2),
        };
        let report = replica.run().await.unwrap();
        assert_eq!(report.applied, 90);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.committed, 30);
        assert!(report.matches_expected);
    }
}
