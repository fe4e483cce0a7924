//! Cross-chain block ordering
//!
//! Architecture:
//! - Each sub-chain's leader stamps new blocks with its current view (`OrderAssigner`)
//! - Every chain replicates a signed decision per block through its own log
//! - `OrderManager` merges the N decisions of a block into a final vector clock,
//!   tracks dependencies between blocks and commits them in one global order
//! - Committed blocks are handed to the ledger through a `CommitSink`

pub mod assigner;
pub mod cell;
pub mod config;
pub mod error;
pub mod ingress;
pub mod manager;
mod resolver;
pub mod scheduler;
pub mod signing;
pub mod sink;
pub mod store;
pub mod trace;
pub mod types;
pub mod vector_clock;

pub use assigner::OrderAssigner;
pub use cell::{Cell, CellState, CommittedCell};
pub use config::OrderConfig;
pub use error::{InputError, SequenceViolation};
pub use ingress::{DecisionIngress, IngressError, LogCallbacks};
pub use manager::OrderManager;
pub use signing::{Ed25519Verifier, VerifyError, VoteSigner, VoteVerifier};
pub use sink::{commit_channel, ChannelSink, CommitSink, CommitStream};
pub use trace::{DecisionTrace, TraceConfig, TraceMode, TracedDecision};
pub use types::*;
pub use vector_clock::VectorClock;
