//! Ballot display client: keeps the board in step with the contract and
//! submits votes.

use ethers::types::{Address, TxHash};
use futures::future::join_all;
use tracing::{info, warn};

use crate::board::{Board, SlotContent};
use crate::contracts::{ContractInterface, CANDIDATE_LIST, CONTRACT_OWNER, VALID_CANDIDATE};
use crate::error::BallotError;
use crate::ledger::{VoteCount, VoteTicket, VotingLedger};
use crate::registry::{CandidateId, CandidateRegistry, DisplaySlot};

/// Upper bound on `candidateList` entries read during an audit.
pub const MAX_LISTED_CANDIDATES: u64 = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteSettings {
    pub gas: u64,
    /// Sender account; the node's first account when unset.
    pub from: Option<Address>,
    /// Refuse to submit votes for candidates missing from the registry.
    pub strict_candidates: bool,
}

impl Default for VoteSettings {
    fn default() -> Self {
        Self {
            gas: 140_000,
            from: None,
            strict_candidates: false,
        }
    }
}

/// Outcome of [`BallotClient::initialize`].
#[derive(Debug, Default)]
pub struct TallyReport {
    pub counts: Vec<(DisplaySlot, VoteCount)>,
    pub failures: Vec<(DisplaySlot, BallotError)>,
}

impl TallyReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteReceipt {
    pub candidate: CandidateId,
    pub slot: DisplaySlot,
    pub tx_hash: TxHash,
    pub count: VoteCount,
}

/// Registry coverage against the contract's own candidate list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryAudit {
    pub on_chain: Vec<CandidateId>,
    /// Listed by the contract but without a display slot.
    pub unregistered: Vec<CandidateId>,
    /// Registered locally but not listed by the contract.
    pub not_on_chain: Vec<CandidateId>,
    /// The contract lists more than [`MAX_LISTED_CANDIDATES`] entries.
    pub truncated: bool,
}

impl RegistryAudit {
    pub fn is_consistent(&self) -> bool {
        self.unregistered.is_empty() && self.not_on_chain.is_empty()
    }
}

pub struct BallotClient<L> {
    ledger: L,
    registry: CandidateRegistry,
    settings: VoteSettings,
    interface: Option<ContractInterface>,
}

impl<L: VotingLedger> BallotClient<L> {
    pub fn new(ledger: L, registry: CandidateRegistry, settings: VoteSettings) -> Self {
        Self {
            ledger,
            registry,
            settings,
            interface: None,
        }
    }

    /// Gate the optional contract calls on what the loaded ABI declares.
    pub fn with_interface(mut self, interface: ContractInterface) -> Self {
        self.interface = Some(interface);
        self
    }

    pub fn registry(&self) -> &CandidateRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Query every registered candidate and render its count. A failed query
    /// renders an error state into that slot instead of leaving it blank.
    pub async fn initialize<B: Board>(&self, board: &mut B) -> TallyReport {
        let queries = self.registry.iter().map(|(id, slot)| async move {
            (slot, self.ledger.total_votes_for(id).await)
        });
        let results = join_all(queries).await;

        let mut report = TallyReport::default();
        for (slot, result) in results {
            match result {
                Ok(count) => {
                    board.render(slot, &SlotContent::Count(count));
                    report.counts.push((slot.clone(), count));
                }
                Err(err) => {
                    warn!(%slot, error = %err, "tally query failed");
                    board.render(slot, &SlotContent::Error(err.to_string()));
                    report.failures.push((slot.clone(), err));
                }
            }
        }
        info!(
            candidates = self.registry.len(),
            failed = report.failures.len(),
            "tally rendered"
        );
        report
    }

    /// Submit a vote, then re-query and redisplay that candidate once the
    /// node has accepted the transaction.
    ///
    /// An unregistered selection is still submitted unless
    /// [`VoteSettings::strict_candidates`] is set; either way it comes back as
    /// [`BallotError::UnknownCandidate`] and no slot is touched.
    pub async fn vote_for_candidate<B: Board>(
        &self,
        selection: &CandidateId,
        board: &mut B,
    ) -> Result<VoteReceipt, BallotError> {
        let slot = self.registry.slot_for(selection).cloned();
        if slot.is_none() && self.settings.strict_candidates {
            return Err(BallotError::UnknownCandidate {
                candidate: *selection,
                tx_hash: None,
            });
        }

        let ticket = VoteTicket {
            from: self.sender().await?,
            gas: self.settings.gas,
        };
        let tx_hash = self.ledger.vote_for_candidate(selection, ticket).await?;
        info!(candidate = %selection, tx_hash = ?tx_hash, from = ?ticket.from, "vote submitted");

        let Some(slot) = slot else {
            warn!(candidate = %selection, "voted for a candidate without a display slot");
            return Err(BallotError::UnknownCandidate {
                candidate: *selection,
                tx_hash: Some(tx_hash),
            });
        };

        match self.ledger.total_votes_for(selection).await {
            Ok(count) => {
                board.render(&slot, &SlotContent::Count(count));
                info!(candidate = %selection, %slot, count, "candidate has been voted");
                Ok(VoteReceipt {
                    candidate: *selection,
                    slot,
                    tx_hash,
                    count,
                })
            }
            Err(err) => {
                board.render(&slot, &SlotContent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Ask the contract whether it knows the candidate.
    pub async fn check(&self, candidate: &CandidateId) -> Result<bool, BallotError> {
        self.require(VALID_CANDIDATE)?;
        self.ledger.valid_candidate(candidate).await
    }

    pub async fn owner(&self) -> Result<Address, BallotError> {
        self.require(CONTRACT_OWNER)?;
        self.ledger.contract_owner().await
    }

    /// Walk the contract's candidate list and compare it with the registry.
    pub async fn audit(&self) -> Result<RegistryAudit, BallotError> {
        self.require(CANDIDATE_LIST)?;
        let mut audit = RegistryAudit::default();
        for index in 0..MAX_LISTED_CANDIDATES {
            match self.ledger.candidate_at(index).await? {
                Some(id) => audit.on_chain.push(id),
                None => break,
            }
        }
        if audit.on_chain.len() as u64 == MAX_LISTED_CANDIDATES {
            audit.truncated = self
                .ledger
                .candidate_at(MAX_LISTED_CANDIDATES)
                .await?
                .is_some();
        }

        audit.unregistered = audit
            .on_chain
            .iter()
            .filter(|id| !self.registry.contains(id))
            .copied()
            .collect();
        audit.not_on_chain = self
            .registry
            .ids()
            .filter(|id| !audit.on_chain.contains(id))
            .copied()
            .collect();
        Ok(audit)
    }

    async fn sender(&self) -> Result<Address, BallotError> {
        if let Some(from) = self.settings.from {
            return Ok(from);
        }
        self.ledger
            .accounts()
            .await?
            .first()
            .copied()
            .ok_or(BallotError::NoAccounts)
    }

    fn require(&self, name: &'static str) -> Result<(), BallotError> {
        match &self.interface {
            Some(interface) => interface.require(name),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::board::MemoryBoard;
    use crate::registry::CandidateEntry;

    const ALICE: &str = "0xb7778275F81fC85D4030752aE9dfbbaD66629C6d";
    const BOB: &str = "0xfBC666302d9D64be97642e2cbD8b8c94d45b61a6";
    const CAROL: &str = "0xB8f3018A53e8CC8eb88bf24d588e6609C2ae9794";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Total(CandidateId),
        Vote(CandidateId, VoteTicket),
        Accounts,
    }

    /// In-memory contract: submitting a vote bumps the stored count.
    #[derive(Default)]
    struct MockLedger {
        votes: Mutex<HashMap<CandidateId, VoteCount>>,
        listed: Vec<CandidateId>,
        accounts: Vec<Address>,
        failing: Vec<CandidateId>,
        calls: Mutex<Vec<Call>>,
    }

    impl MockLedger {
        fn with_votes(votes: &[(&str, VoteCount)]) -> Self {
            let map = votes
                .iter()
                .map(|(id, n)| (id_of(id), *n))
                .collect::<HashMap<_, _>>();
            Self {
                votes: Mutex::new(map),
                accounts: vec![Address::repeat_byte(0xa1), Address::repeat_byte(0xa2)],
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn votes_submitted(&self) -> Vec<CandidateId> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Vote(id, _) => Some(id),
                    _ => None,
                })
                .collect()
        }

        fn queries_for(&self, id: &CandidateId) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Total(q) if q == id))
                .count()
        }
    }

    #[async_trait]
    impl VotingLedger for MockLedger {
        async fn total_votes_for(&self, candidate: &CandidateId) -> Result<VoteCount, BallotError> {
            self.calls.lock().unwrap().push(Call::Total(*candidate));
            if self.failing.contains(candidate) {
                return Err(BallotError::Connection("connection refused".into()));
            }
            Ok(*self.votes.lock().unwrap().get(candidate).unwrap_or(&0))
        }

        async fn vote_for_candidate(
            &self,
            candidate: &CandidateId,
            ticket: VoteTicket,
        ) -> Result<TxHash, BallotError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Vote(*candidate, ticket));
            *self.votes.lock().unwrap().entry(*candidate).or_insert(0) += 1;
            Ok(TxHash::repeat_byte(0x77))
        }

        async fn valid_candidate(&self, candidate: &CandidateId) -> Result<bool, BallotError> {
            Ok(self.listed.contains(candidate))
        }

        async fn candidate_at(&self, index: u64) -> Result<Option<CandidateId>, BallotError> {
            Ok(self.listed.get(index as usize).copied())
        }

        async fn contract_owner(&self) -> Result<Address, BallotError> {
            Ok(Address::repeat_byte(0x0e))
        }

        async fn accounts(&self) -> Result<Vec<Address>, BallotError> {
            self.calls.lock().unwrap().push(Call::Accounts);
            Ok(self.accounts.clone())
        }
    }

    fn id_of(s: &str) -> CandidateId {
        CandidateId::parse(s).unwrap()
    }

    fn registry(entries: &[(&str, &str)]) -> CandidateRegistry {
        let entries = entries
            .iter()
            .map(|(id, slot)| CandidateEntry {
                id: id.to_string(),
                slot: slot.to_string(),
            })
            .collect::<Vec<_>>();
        CandidateRegistry::from_entries(&entries).unwrap()
    }

    fn three_candidates() -> CandidateRegistry {
        registry(&[
            (ALICE, "candidate-1"),
            (BOB, "candidate-2"),
            (CAROL, "candidate-3"),
        ])
    }

    #[tokio::test]
    async fn initialize_renders_every_registered_count() {
        let ledger = MockLedger::with_votes(&[(ALICE, 3), (BOB, 0), (CAROL, 12)]);
        let client = BallotClient::new(ledger, three_candidates(), VoteSettings::default());
        let mut board = MemoryBoard::new();

        let report = client.initialize(&mut board).await;

        assert!(report.is_complete());
        assert_eq!(report.counts.len(), 3);
        assert_eq!(board.get("candidate-1"), Some("3"));
        assert_eq!(board.get("candidate-2"), Some("0"));
        assert_eq!(board.get("candidate-3"), Some("12"));
    }

    #[tokio::test]
    async fn initialize_is_idempotent_for_unchanged_state() {
        let ledger = MockLedger::with_votes(&[(ALICE, 3), (BOB, 5)]);
        let client = BallotClient::new(ledger, three_candidates(), VoteSettings::default());

        let mut first = MemoryBoard::new();
        client.initialize(&mut first).await;
        let mut second = first.clone();
        client.initialize(&mut second).await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failed_query_renders_error_state() {
        let mut ledger = MockLedger::with_votes(&[(ALICE, 3), (BOB, 1)]);
        ledger.failing.push(id_of(BOB));
        let client = BallotClient::new(ledger, three_candidates(), VoteSettings::default());
        let mut board = MemoryBoard::new();

        let report = client.initialize(&mut board).await;

        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0.as_str(), "candidate-2");
        assert!(matches!(report.failures[0].1, BallotError::Connection(_)));
        assert_eq!(board.get("candidate-1"), Some("3"));
        let shown = board.get("candidate-2").unwrap();
        assert!(shown.starts_with("error:"), "{shown}");
    }

    #[tokio::test]
    async fn vote_submits_once_and_redisplays_once() {
        let ledger = MockLedger::with_votes(&[(ALICE, 3)]);
        let client = BallotClient::new(
            ledger,
            registry(&[(ALICE, "candidate-1")]),
            VoteSettings::default(),
        );
        let mut board = MemoryBoard::new();
        client.initialize(&mut board).await;
        assert_eq!(board.get("candidate-1"), Some("3"));

        let alice = id_of(ALICE);
        let receipt = client.vote_for_candidate(&alice, &mut board).await.unwrap();

        assert_eq!(receipt.count, 4);
        assert_eq!(receipt.slot.as_str(), "candidate-1");
        assert_eq!(receipt.tx_hash, TxHash::repeat_byte(0x77));
        assert_eq!(board.get("candidate-1"), Some("4"));
        assert_eq!(client.ledger().votes_submitted(), vec![alice]);
        // one query from initialize, exactly one after the vote
        assert_eq!(client.ledger().queries_for(&alice), 2);
    }

    #[tokio::test]
    async fn vote_uses_first_node_account_and_configured_gas() {
        let ledger = MockLedger::with_votes(&[]);
        let settings = VoteSettings {
            gas: 90_000,
            ..VoteSettings::default()
        };
        let client = BallotClient::new(ledger, registry(&[(ALICE, "candidate-1")]), settings);
        let mut board = MemoryBoard::new();

        client
            .vote_for_candidate(&id_of(ALICE), &mut board)
            .await
            .unwrap();

        let expected = VoteTicket {
            from: Address::repeat_byte(0xa1),
            gas: 90_000,
        };
        assert!(client
            .ledger()
            .calls()
            .contains(&Call::Vote(id_of(ALICE), expected)));
    }

    #[tokio::test]
    async fn configured_sender_skips_account_lookup() {
        let ledger = MockLedger::with_votes(&[]);
        let settings = VoteSettings {
            from: Some(Address::repeat_byte(0x55)),
            ..VoteSettings::default()
        };
        let client = BallotClient::new(ledger, registry(&[(ALICE, "candidate-1")]), settings);
        let mut board = MemoryBoard::new();

        client
            .vote_for_candidate(&id_of(ALICE), &mut board)
            .await
            .unwrap();

        assert!(!client.ledger().calls().contains(&Call::Accounts));
    }

    #[tokio::test]
    async fn no_accounts_is_reported_before_submitting() {
        let mut ledger = MockLedger::with_votes(&[]);
        ledger.accounts.clear();
        let client = BallotClient::new(
            ledger,
            registry(&[(ALICE, "candidate-1")]),
            VoteSettings::default(),
        );
        let mut board = MemoryBoard::new();

        let err = client
            .vote_for_candidate(&id_of(ALICE), &mut board)
            .await
            .unwrap_err();

        assert!(matches!(err, BallotError::NoAccounts));
        assert!(client.ledger().votes_submitted().is_empty());
    }

    #[tokio::test]
    async fn unknown_candidate_is_submitted_but_not_displayed() {
        let ledger = MockLedger::with_votes(&[(ALICE, 3)]);
        let client = BallotClient::new(
            ledger,
            registry(&[(ALICE, "candidate-1")]),
            VoteSettings::default(),
        );
        let mut board = MemoryBoard::new();
        client.initialize(&mut board).await;
        let before = board.clone();

        let stranger = id_of("0xdeadbeef");
        let err = client
            .vote_for_candidate(&stranger, &mut board)
            .await
            .unwrap_err();

        match err {
            BallotError::UnknownCandidate { candidate, tx_hash } => {
                assert_eq!(candidate, stranger);
                assert_eq!(tx_hash, Some(TxHash::repeat_byte(0x77)));
            }
            other => panic!("expected unknown candidate, got {other:?}"),
        }
        assert_eq!(client.ledger().votes_submitted(), vec![stranger]);
        assert_eq!(client.ledger().queries_for(&stranger), 0);
        assert_eq!(board, before);
    }

    #[tokio::test]
    async fn strict_mode_rejects_unknown_candidate_before_submitting() {
        let ledger = MockLedger::with_votes(&[]);
        let settings = VoteSettings {
            strict_candidates: true,
            ..VoteSettings::default()
        };
        let client = BallotClient::new(ledger, registry(&[(ALICE, "candidate-1")]), settings);
        let mut board = MemoryBoard::new();

        let err = client
            .vote_for_candidate(&id_of(BOB), &mut board)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BallotError::UnknownCandidate { tx_hash: None, .. }
        ));
        assert!(client.ledger().calls().is_empty());
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn failed_requery_after_vote_shows_error_state() {
        let mut ledger = MockLedger::with_votes(&[]);
        ledger.failing.push(id_of(ALICE));
        let client = BallotClient::new(
            ledger,
            registry(&[(ALICE, "candidate-1")]),
            VoteSettings::default(),
        );
        let mut board = MemoryBoard::new();

        let err = client
            .vote_for_candidate(&id_of(ALICE), &mut board)
            .await
            .unwrap_err();

        assert!(matches!(err, BallotError::Connection(_)));
        assert_eq!(client.ledger().votes_submitted().len(), 1);
        assert!(board.get("candidate-1").unwrap().starts_with("error:"));
    }

    #[tokio::test]
    async fn audit_reports_registry_gaps() {
        let mut ledger = MockLedger::with_votes(&[]);
        ledger.listed = vec![id_of(ALICE), id_of(BOB)];
        let client = BallotClient::new(
            ledger,
            registry(&[(ALICE, "candidate-1"), (CAROL, "candidate-3")]),
            VoteSettings::default(),
        );

        let audit = client.audit().await.unwrap();

        assert_eq!(audit.on_chain, vec![id_of(ALICE), id_of(BOB)]);
        assert_eq!(audit.unregistered, vec![id_of(BOB)]);
        assert_eq!(audit.not_on_chain, vec![id_of(CAROL)]);
        assert!(!audit.truncated);
        assert!(!audit.is_consistent());
    }

    fn numbered(n: u64) -> Vec<CandidateId> {
        (0..n)
            .map(|i| {
                let mut bytes = [0u8; 32];
                bytes[..8].copy_from_slice(&(i + 1).to_be_bytes());
                CandidateId::from_bytes(bytes)
            })
            .collect()
    }

    #[tokio::test]
    async fn audit_of_full_list_is_not_truncated() {
        let mut ledger = MockLedger::with_votes(&[]);
        ledger.listed = numbered(MAX_LISTED_CANDIDATES);
        let client = BallotClient::new(ledger, three_candidates(), VoteSettings::default());

        let audit = client.audit().await.unwrap();

        assert_eq!(audit.on_chain.len() as u64, MAX_LISTED_CANDIDATES);
        assert!(!audit.truncated);
    }

    #[tokio::test]
    async fn audit_past_the_cap_is_truncated() {
        let mut ledger = MockLedger::with_votes(&[]);
        ledger.listed = numbered(MAX_LISTED_CANDIDATES + 1);
        let client = BallotClient::new(ledger, three_candidates(), VoteSettings::default());

        let audit = client.audit().await.unwrap();

        assert_eq!(audit.on_chain.len() as u64, MAX_LISTED_CANDIDATES);
        assert!(audit.truncated);
    }

    #[tokio::test]
    async fn check_and_owner_pass_through() {
        let mut ledger = MockLedger::with_votes(&[]);
        ledger.listed = vec![id_of(ALICE)];
        let client = BallotClient::new(ledger, three_candidates(), VoteSettings::default());

        assert!(client.check(&id_of(ALICE)).await.unwrap());
        assert!(!client.check(&id_of(BOB)).await.unwrap());
        assert_eq!(client.owner().await.unwrap(), Address::repeat_byte(0x0e));
    }

    #[tokio::test]
    async fn interface_without_owner_blocks_owner_query() {
        let abi = r#"[
            {"constant":true,"inputs":[{"name":"candidate","type":"bytes32"}],"name":"totalVotesFor","outputs":[{"name":"","type":"uint8"}],"payable":false,"type":"function"},
            {"constant":false,"inputs":[{"name":"candidate","type":"bytes32"}],"name":"voteForCandidate","outputs":[],"payable":false,"type":"function"}
        ]"#;
        let client = BallotClient::new(
            MockLedger::with_votes(&[]),
            three_candidates(),
            VoteSettings::default(),
        )
        .with_interface(ContractInterface::from_json(abi).unwrap());

        assert!(matches!(
            client.owner().await,
            Err(BallotError::Interface(_))
        ));
        assert!(matches!(
            client.audit().await,
            Err(BallotError::Interface(_))
        ));
    }
}
