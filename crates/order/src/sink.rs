//! Delivery of committed cells to the ledger layer
//!
//! The sink runs while the manager's lock is held, so it must never call back
//! into the manager. Use [`commit_channel`] to hand commits to another thread.

use crate::cell::CommittedCell;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// Receives every committed cell, once, in final order
pub trait CommitSink: Send {
    fn on_commit(&mut self, cell: &CommittedCell);
}

impl<F> CommitSink for F
where
    F: FnMut(&CommittedCell) + Send,
{
    fn on_commit(&mut self, cell: &CommittedCell) {
        self(cell)
    }
}

/// Sink half of a commit channel
#[derive(Clone)]
pub struct ChannelSink {
    sender: Sender<CommittedCell>,
}

impl CommitSink for ChannelSink {
    fn on_commit(&mut self, cell: &CommittedCell) {
        if self.sender.send(cell.clone()).is_err() {
            tracing::warn!("Commit stream dropped, cell {} not delivered", cell.id);
        }
    }
}

/// Receiving half of a commit channel
pub struct CommitStream {
    receiver: Receiver<CommittedCell>,
}

impl CommitStream {
    /// Wait up to `timeout` for the next commit
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CommittedCell> {
        match self.receiver.recv_timeout(timeout) {
            Ok(cell) => Some(cell),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take everything already delivered without waiting
    pub fn try_drain(&self) -> Vec<CommittedCell> {
        self.receiver.try_iter().collect()
    }

    /// Collect up to `count` commits, giving up at the deadline.
    ///
    /// Returns whatever arrived in time; check the length against `count`.
    pub fn collect(&self, count: usize, timeout: Duration) -> Vec<CommittedCell> {
        let deadline = Instant::now() + timeout;
        let mut cells = Vec::with_capacity(count);
        while cells.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(cell) => cells.push(cell),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        cells
    }
}

/// Create an unbounded sink/stream pair.
///
/// Unbounded so a slow consumer can never block the manager's lock.
pub fn commit_channel() -> (ChannelSink, CommitStream) {
    let (sender, receiver) = unbounded();
    (ChannelSink { sender }, CommitStream { receiver })
}
