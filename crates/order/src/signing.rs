//! Signing and verification of replicated decisions

use crate::types::{BlockOrderVote, ChainId, SignedBlockOrderVote};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("no key registered for reporter chain {0}")]
    UnknownReporter(ChainId),

    #[error("malformed signature from reporter chain {0}")]
    MalformedSignature(ChainId),

    #[error("signature from reporter chain {0} does not match vote")]
    BadSignature(ChainId),
}

/// Credential check applied before a decision reaches the manager
pub trait VoteVerifier: Send + Sync {
    fn verify(&self, signed: &SignedBlockOrderVote) -> Result<(), VerifyError>;
}

/// Signs votes on behalf of one reporter chain's leader
pub struct VoteSigner {
    reporter: ChainId,
    key: SigningKey,
}

impl VoteSigner {
    pub fn new(reporter: ChainId, key: SigningKey) -> Self {
        Self { reporter, key }
    }

    /// Deterministic key from a 32-byte seed
    pub fn from_seed(reporter: ChainId, seed: [u8; 32]) -> Self {
        Self::new(reporter, SigningKey::from_bytes(&seed))
    }

    pub fn reporter(&self) -> ChainId {
        self.reporter
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn sign(&self, vote: BlockOrderVote) -> SignedBlockOrderVote {
        let signature = self.key.sign(&vote.compute_hash());
        SignedBlockOrderVote {
            vote,
            reporter: self.reporter,
            signature: signature.to_bytes().to_vec(),
        }
    }
}

/// Verifies votes against each reporter chain's leader key
#[derive(Default)]
pub struct Ed25519Verifier {
    keys: HashMap<ChainId, VerifyingKey>,
}

impl Ed25519Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reporter: ChainId, key: VerifyingKey) {
        self.keys.insert(reporter, key);
    }

    pub fn with_key(mut self, reporter: ChainId, key: VerifyingKey) -> Self {
        self.register(reporter, key);
        self
    }
}

impl VoteVerifier for Ed25519Verifier {
    fn verify(&self, signed: &SignedBlockOrderVote) -> Result<(), VerifyError> {
        let key = self
            .keys
            .get(&signed.reporter)
            .ok_or(VerifyError::UnknownReporter(signed.reporter))?;
        let signature = Signature::from_slice(&signed.signature)
            .map_err(|_| VerifyError::MalformedSignature(signed.reporter))?;
        key.verify(&signed.vote.compute_hash(), &signature)
            .map_err(|_| VerifyError::BadSignature(signed.reporter))
    }
}
