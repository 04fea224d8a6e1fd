use ethers::types::TxHash;
use thiserror::Error;

use crate::registry::CandidateId;

/// Errors surfaced by the ballot client to whatever renders the board.
#[derive(Debug, Error)]
pub enum BallotError {
    /// The node could not be reached (transport failure, timeout, refused connection).
    #[error("node unreachable: {0}")]
    Connection(String),

    /// A read-only contract call failed or returned something other than the declared shape.
    #[error("query {method} failed: {reason}")]
    Query { method: &'static str, reason: String },

    /// The vote transaction was rejected by the node or reverted.
    #[error("vote submission for {candidate} failed: {reason}")]
    Submission { candidate: CandidateId, reason: String },

    /// The selection has no display slot in the registry.
    #[error("candidate {candidate} is not registered{}", submitted_suffix(.tx_hash))]
    UnknownCandidate {
        candidate: CandidateId,
        tx_hash: Option<TxHash>,
    },

    #[error("invalid candidate id {input:?}: {reason}")]
    InvalidCandidateId { input: String, reason: String },

    #[error("invalid display slot {0:?}")]
    InvalidSlot(String),

    #[error("duplicate registry entry: {0}")]
    DuplicateEntry(String),

    /// The contract interface description cannot be used.
    #[error("contract interface: {0}")]
    Interface(String),

    #[error("node reports no accounts to vote from")]
    NoAccounts,
}

fn submitted_suffix(tx_hash: &Option<TxHash>) -> String {
    match tx_hash {
        Some(hash) => format!(" (vote already submitted as {hash:#x})"),
        None => String::new(),
    }
}

impl BallotError {
    pub fn query(method: &'static str, reason: impl ToString) -> Self {
        BallotError::Query {
            method,
            reason: reason.to_string(),
        }
    }
}
