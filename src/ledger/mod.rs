//! Remote side of the ballot: the deployed Voting contract.
//!
//! [`VotingLedger`] is the seam between the display client and the node.
//! [`eth::EthLedger`] binds it to a JSON-RPC endpoint; tests substitute an
//! in-memory ledger.

use async_trait::async_trait;
use ethers::types::{Address, TxHash};

use crate::error::BallotError;
use crate::registry::CandidateId;

pub mod eth;

pub use eth::EthLedger;

/// Votes per candidate as stored by the contract (`uint8`).
pub type VoteCount = u8;

/// Sender and resource budget attached to a vote transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteTicket {
    pub from: Address,
    pub gas: u64,
}

#[async_trait]
pub trait VotingLedger: Send + Sync {
    /// Read-only `totalVotesFor` call.
    async fn total_votes_for(&self, candidate: &CandidateId) -> Result<VoteCount, BallotError>;

    /// Submit `voteForCandidate`. Resolves once the node has accepted the
    /// transaction; it does not wait for a receipt.
    async fn vote_for_candidate(
        &self,
        candidate: &CandidateId,
        ticket: VoteTicket,
    ) -> Result<TxHash, BallotError>;

    async fn valid_candidate(&self, candidate: &CandidateId) -> Result<bool, BallotError>;

    /// Entry `index` of the contract's candidate list, `None` past the end.
    async fn candidate_at(&self, index: u64) -> Result<Option<CandidateId>, BallotError>;

    async fn contract_owner(&self) -> Result<Address, BallotError>;

    /// Accounts the node can sign for, in the node's order.
    async fn accounts(&self) -> Result<Vec<Address>, BallotError>;
}
