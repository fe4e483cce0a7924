//! Ingress from the replicated log into the order manager
//!
//! The consensus transport that replicates each chain's decisions is external.
//! It drives [`LogCallbacks`]; [`DecisionIngress`] is the implementation that
//! decodes, verifies and forwards each applied entry.

use crate::error::InputError;
use crate::manager::OrderManager;
use crate::signing::{VerifyError, VoteVerifier};
use crate::types::{CellId, ChainId, DecisionOutcome, SignedBlockOrderVote};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngressError {
    #[error("undecodable log entry: {0}")]
    Decode(#[from] borsh::io::Error),

    #[error("vote failed verification: {0}")]
    Verify(#[from] VerifyError),

    #[error("reporter {reporter} already voted on {cell}")]
    DuplicateReporter { reporter: ChainId, cell: CellId },

    #[error("vote rejected by order manager: {0}")]
    Input(#[from] InputError),
}

/// Callbacks the replicated-log layer invokes on this node
pub trait LogCallbacks: Send + Sync {
    /// A committed log entry is ready to apply
    fn on_apply(&self, entry: &[u8]) -> Result<DecisionOutcome, IngressError>;

    /// This node became leader of its local log group
    fn on_leader_start(&self, _term: u64) {}

    /// This node stopped being leader
    fn on_leader_stop(&self) {}
}

/// Verifies replicated votes and hands them to the order manager
///
/// Each reporter counts once per cell. Reporters are tracked only while a
/// cell is pending; once it merges, the manager itself rejects further votes.
pub struct DecisionIngress {
    manager: Arc<OrderManager>,
    verifier: Box<dyn VoteVerifier>,
    voters: Mutex<HashMap<CellId, BTreeSet<ChainId>>>,
    applied: AtomicU64,
    dropped: AtomicU64,
}

impl DecisionIngress {
    pub fn new(manager: Arc<OrderManager>, verifier: impl VoteVerifier + 'static) -> Self {
        Self {
            manager,
            verifier: Box::new(verifier),
            voters: Mutex::new(HashMap::new()),
            applied: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn manager(&self) -> &Arc<OrderManager> {
        &self.manager
    }

    /// Verify and forward an already-decoded vote
    pub fn apply_vote(&self, signed: SignedBlockOrderVote) -> Result<DecisionOutcome, IngressError> {
        let reporter = signed.reporter;
        let result = self
            .verifier
            .verify(&signed)
            .map_err(IngressError::from)
            .and_then(|()| self.forward(signed));

        match &result {
            Ok(_) => {
                self.applied.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Dropping vote from reporter {}: {}", reporter, e);
            }
        }
        result
    }

    fn forward(&self, signed: SignedBlockOrderVote) -> Result<DecisionOutcome, IngressError> {
        let vote = signed.vote;
        let cell = CellId::new(vote.chain_id, vote.block_id);

        // held across the push so two copies of one vote cannot both pass
        let mut voters = self.voters.lock();
        if voters.get(&cell).is_some_and(|seen| seen.contains(&signed.reporter)) {
            return Err(IngressError::DuplicateReporter {
                reporter: signed.reporter,
                cell,
            });
        }

        let outcome = self
            .manager
            .push_decision(vote.chain_id, vote.block_id, vote.vote_vector)?;
        match outcome {
            DecisionOutcome::Pending { .. } => {
                voters.entry(cell).or_default().insert(signed.reporter);
            }
            DecisionOutcome::Merged => {
                voters.remove(&cell);
            }
        }
        Ok(outcome)
    }

    /// Entries forwarded to the manager
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Entries dropped as invalid
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl LogCallbacks for DecisionIngress {
    fn on_apply(&self, entry: &[u8]) -> Result<DecisionOutcome, IngressError> {
        let signed = match SignedBlockOrderVote::from_bytes(entry) {
            Ok(signed) => signed,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Dropping undecodable log entry ({} bytes): {}", entry.len(), e);
                return Err(e.into());
            }
        };
        self.apply_vote(signed)
    }

    fn on_leader_start(&self, term: u64) {
        tracing::info!("Became leader of local log group at term {}", term);
    }

    fn on_leader_stop(&self) {
        tracing::info!("Stepped down as leader of local log group");
    }
}
