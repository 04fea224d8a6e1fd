//! JSON-RPC binding of [`VotingLedger`] through `ethers`.
//!
//! The ABI is bound at runtime from the loaded [`ContractInterface`], so a
//! redeployed contract only needs a new description file. Transactions are
//! sent with `eth_sendTransaction` and signed by the node's own account.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use ethers::{
    contract::{Contract, ContractError},
    providers::{Http, JsonRpcError, Middleware, Provider, ProviderError},
    types::{Address, TxHash, U256},
};
use tracing::{debug, info};

use super::{VoteCount, VoteTicket, VotingLedger};
use crate::contracts::{
    ContractInterface, CANDIDATE_LIST, CONTRACT_OWNER, TOTAL_VOTES_FOR, VALID_CANDIDATE,
    VOTE_FOR_CANDIDATE,
};
use crate::error::BallotError;
use crate::registry::CandidateId;

type Client = Provider<Http>;

#[derive(Debug, Clone)]
pub struct EthLedgerConfig {
    pub rpc_url: String,
    pub timeout_ms: u64,
    pub contract: Address,
    /// Send type-0 transactions for nodes without EIP-1559 support.
    pub legacy_tx: bool,
}

pub struct EthLedger {
    provider: Arc<Client>,
    contract: Contract<Client>,
    legacy_tx: bool,
}

impl EthLedger {
    /// Bind the contract and check that the node answers.
    pub async fn connect(
        cfg: &EthLedgerConfig,
        iface: &ContractInterface,
    ) -> Result<Self, BallotError> {
        let url = reqwest::Url::parse(cfg.rpc_url.trim())
            .map_err(|e| BallotError::Connection(format!("invalid rpc url {}: {e}", cfg.rpc_url)))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| BallotError::Connection(format!("failed to build http client: {e}")))?;
        let provider = Arc::new(Provider::new(Http::new_with_client(url, http_client)));

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| provider_failure(e, |reason| BallotError::query("eth_chainId", reason)))?;
        info!(
            rpc_url = %cfg.rpc_url,
            chain_id = %chain_id,
            contract = ?cfg.contract,
            abi_sha256 = %iface.fingerprint_hex(),
            "bound voting contract"
        );

        let contract = Contract::new(cfg.contract, iface.abi().clone(), provider.clone());
        Ok(Self {
            provider,
            contract,
            legacy_tx: cfg.legacy_tx,
        })
    }
}

#[async_trait]
impl VotingLedger for EthLedger {
    async fn total_votes_for(&self, candidate: &CandidateId) -> Result<VoteCount, BallotError> {
        debug!(%candidate, "totalVotesFor");
        let raw = self
            .contract
            .method::<_, U256>(TOTAL_VOTES_FOR, *candidate.as_bytes())
            .map_err(|e| BallotError::Interface(e.to_string()))?
            .call()
            .await
            .map_err(|e| contract_failure(e, |reason| BallotError::query(TOTAL_VOTES_FOR, reason)))?;
        narrow_count(raw)
    }

    async fn vote_for_candidate(
        &self,
        candidate: &CandidateId,
        ticket: VoteTicket,
    ) -> Result<TxHash, BallotError> {
        let mut call = self
            .contract
            .method::<_, ()>(VOTE_FOR_CANDIDATE, *candidate.as_bytes())
            .map_err(|e| BallotError::Interface(e.to_string()))?
            .from(ticket.from)
            .gas(ticket.gas);
        if self.legacy_tx {
            call = call.legacy();
        }
        let submission = |reason: String| BallotError::Submission {
            candidate: *candidate,
            reason,
        };
        let pending = call
            .send()
            .await
            .map_err(|e| contract_failure(e, submission))?;
        Ok(pending.tx_hash())
    }

    async fn valid_candidate(&self, candidate: &CandidateId) -> Result<bool, BallotError> {
        self.contract
            .method::<_, bool>(VALID_CANDIDATE, *candidate.as_bytes())
            .map_err(|e| BallotError::Interface(e.to_string()))?
            .call()
            .await
            .map_err(|e| contract_failure(e, |reason| BallotError::query(VALID_CANDIDATE, reason)))
    }

    async fn candidate_at(&self, index: u64) -> Result<Option<CandidateId>, BallotError> {
        let result = self
            .contract
            .method::<_, [u8; 32]>(CANDIDATE_LIST, U256::from(index))
            .map_err(|e| BallotError::Interface(e.to_string()))?
            .call()
            .await;
        match result {
            Ok(bytes) => Ok(Some(CandidateId::from_bytes(bytes))),
            // Reading past the end of the array reverts (or hits an invalid
            // opcode on old compilers). Any other node error is a failed query.
            Err(e) if is_end_of_list(&e) => {
                debug!(index, "candidate list exhausted");
                Ok(None)
            }
            Err(e) => Err(contract_failure(e, |reason| {
                BallotError::query(CANDIDATE_LIST, reason)
            })),
        }
    }

    async fn contract_owner(&self) -> Result<Address, BallotError> {
        self.contract
            .method::<_, Address>(CONTRACT_OWNER, ())
            .map_err(|e| BallotError::Interface(e.to_string()))?
            .call()
            .await
            .map_err(|e| contract_failure(e, |reason| BallotError::query(CONTRACT_OWNER, reason)))
    }

    async fn accounts(&self) -> Result<Vec<Address>, BallotError> {
        self.provider
            .get_accounts()
            .await
            .map_err(|e| provider_failure(e, |reason| BallotError::query("eth_accounts", reason)))
    }
}

fn narrow_count(raw: U256) -> Result<VoteCount, BallotError> {
    if raw > U256::from(VoteCount::MAX) {
        return Err(BallotError::query(
            TOTAL_VOTES_FOR,
            format!("count {raw} does not fit uint8"),
        ));
    }
    Ok(raw.low_u32() as VoteCount)
}

/// Transport-level failures become [`BallotError::Connection`]; anything the
/// node answered is handed to `otherwise`.
fn provider_failure(
    err: ProviderError,
    otherwise: impl FnOnce(String) -> BallotError,
) -> BallotError {
    if is_transport_failure(&err) {
        BallotError::Connection(err.to_string())
    } else {
        otherwise(err.to_string())
    }
}

fn contract_failure(
    err: ContractError<Client>,
    otherwise: impl FnOnce(String) -> BallotError,
) -> BallotError {
    match err {
        ContractError::MiddlewareError { e } | ContractError::ProviderError { e } => {
            provider_failure(e, otherwise)
        }
        other => otherwise(other.to_string()),
    }
}

fn is_transport_failure(err: &ProviderError) -> bool {
    match err {
        ProviderError::HTTPError(_) => true,
        ProviderError::JsonRpcClientError(inner) => {
            inner.as_error_response().is_none() && inner.as_serde_error().is_none()
        }
        _ => false,
    }
}

fn is_end_of_list(err: &ContractError<Client>) -> bool {
    match err {
        ContractError::Revert(_) => true,
        ContractError::MiddlewareError { e } | ContractError::ProviderError { e } => match e {
            ProviderError::JsonRpcClientError(inner) => {
                inner.as_error_response().map_or(false, is_revert_response)
            }
            _ => false,
        },
        _ => false,
    }
}

/// Error codes and messages nodes use for a reverted or aborted `eth_call`.
fn is_revert_response(err: &JsonRpcError) -> bool {
    const REVERT_CODES: [i64; 2] = [3, -32015];
    let message = err.message.to_ascii_lowercase();
    REVERT_CODES.contains(&err.code)
        || message.contains("revert")
        || message.contains("invalid opcode")
}
