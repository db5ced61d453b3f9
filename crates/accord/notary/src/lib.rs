//! Accord ordering authority.
//!
//! The authority is the only global-ordering point in the protocol: for any
//! record version it accepts at most one consuming transition. It does not
//! interpret payloads or run the contract; it checks that the quorum signed
//! the exact transition id, that a consumed input is the version it committed
//! earlier and that a created `linear_id` is new. It then enforces
//! consumed-version uniqueness and attests the commit with its own signature
//! and a monotonically increasing sequence.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use accord_crypto::{Ed25519Signer, SigningService};
use accord_types::{
    Attestation, CommittedTransition, LinearId, Party, Proposal, Quorum, RecordRef, TransitionId,
};
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Terminal answer to a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotaryDecision {
    Committed(CommittedTransition),
    /// The input version was already consumed by another committed transition.
    Conflict {
        consumed: RecordRef,
        consumed_by: TransitionId,
    },
    /// The authority refuses the submission outright; resubmitting will not help.
    Rejected { reason: String },
}

/// Failure to obtain a decision at all.
#[derive(Debug, Error)]
pub enum NotaryError {
    #[error("ordering authority unreachable: {0}")]
    Unreachable(String),
}

/// Boundary to the ordering authority.
#[async_trait]
pub trait OrderingAuthority: Send + Sync {
    /// Identity whose key signs attestations.
    fn identity(&self) -> &Party;

    async fn submit(&self, proposal: &Proposal) -> Result<NotaryDecision, NotaryError>;
}

/// Check that `committed` carries a valid attestation from its named
/// authority and that its id is the hash of its proposal.
pub fn verify_attestation(committed: &CommittedTransition) -> bool {
    match committed.proposal.id() {
        Ok(id) if id == committed.id => {}
        _ => return false,
    }
    let bytes = Attestation::signing_bytes(&committed.id, committed.attestation.sequence);
    accord_crypto::verify(
        &committed.attestation.authority,
        &bytes,
        &committed.attestation.signature,
    )
}

/// Check that every required participant signed the proposal's id and that
/// nobody else did. Returns the reason on failure.
pub fn check_quorum(proposal: &Proposal, id: &TransitionId) -> Result<(), String> {
    let quorum = Quorum::for_proposal(proposal);
    let missing = quorum.missing(proposal);
    if !missing.is_empty() {
        return Err(format!("missing signatures from {}", names(&missing)));
    }
    let extraneous = quorum.extraneous(proposal);
    if !extraneous.is_empty() {
        return Err(format!("unexpected signers {}", names(&extraneous)));
    }
    match proposal
        .signatures
        .iter()
        .find(|sig| !accord_crypto::verify_transition(id, sig))
    {
        Some(bad) => Err(format!("invalid signature from {}", bad.party)),
        None => Ok(()),
    }
}

fn names(parties: &[Party]) -> String {
    parties
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Default)]
struct NotaryState {
    consumed: HashMap<RecordRef, TransitionId>,
    committed: HashMap<TransitionId, CommittedTransition>,
    created: HashMap<LinearId, TransitionId>,
    sequence: u64,
}

impl NotaryState {
    /// The input must be exactly the output of a transition committed here,
    /// and a create must not reuse a `linear_id`.
    fn check_lineage(&self, proposal: &Proposal) -> Result<(), String> {
        match &proposal.input {
            Some(input) => {
                let Some(producer) = self.committed.get(&input.reference.produced_by) else {
                    return Err(format!(
                        "input {} was not produced by a committed transition",
                        input.reference
                    ));
                };
                if producer.output() != *input {
                    return Err(format!(
                        "input {} does not match the committed version",
                        input.reference
                    ));
                }
                Ok(())
            }
            None => match self.created.get(&proposal.output.linear_id) {
                Some(by) => Err(format!(
                    "linear id {} was already created by {by}",
                    proposal.output.linear_id
                )),
                None => Ok(()),
            },
        }
    }
}

/// Single-process ordering authority.
///
/// All decisions are taken under one lock, so two submissions consuming the
/// same version are strictly ordered and exactly one wins.
pub struct InMemoryNotary {
    signer: Ed25519Signer,
    state: Mutex<NotaryState>,
    offline: AtomicBool,
    submissions: AtomicU64,
}

impl InMemoryNotary {
    pub fn new(signer: Ed25519Signer) -> Self {
        Self {
            signer,
            state: Mutex::new(NotaryState::default()),
            offline: AtomicBool::new(false),
            submissions: AtomicU64::new(0),
        }
    }

    pub fn generate(name: impl Into<String>) -> Self {
        Self::new(Ed25519Signer::generate(name))
    }

    /// Make every subsequent submission fail with [`NotaryError::Unreachable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of submissions received, including refused ones.
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    pub async fn committed_count(&self) -> usize {
        self.state.lock().await.committed.len()
    }
}

#[async_trait]
impl OrderingAuthority for InMemoryNotary {
    fn identity(&self) -> &Party {
        self.signer.identity()
    }

    async fn submit(&self, proposal: &Proposal) -> Result<NotaryDecision, NotaryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NotaryError::Unreachable(format!(
                "{} is offline",
                self.signer.identity()
            )));
        }
        self.submissions.fetch_add(1, Ordering::SeqCst);

        let id = match proposal.id() {
            Ok(id) => id,
            Err(e) => {
                return Ok(NotaryDecision::Rejected {
                    reason: e.to_string(),
                })
            }
        };

        let mut state = self.state.lock().await;

        if let Some(existing) = state.committed.get(&id) {
            debug!(transition = %id, "resubmission of committed transition");
            return Ok(NotaryDecision::Committed(existing.clone()));
        }

        if let Err(reason) = check_quorum(proposal, &id) {
            warn!(transition = %id, %reason, "submission rejected");
            return Ok(NotaryDecision::Rejected { reason });
        }

        if let Err(reason) = state.check_lineage(proposal) {
            warn!(transition = %id, %reason, "submission rejected");
            return Ok(NotaryDecision::Rejected { reason });
        }

        let input = proposal.input.as_ref().map(|input| input.reference);
        if let Some(consumed) = input {
            if let Some(consumed_by) = state.consumed.get(&consumed) {
                info!(
                    transition = %id,
                    %consumed,
                    consumed_by = %consumed_by,
                    "input already consumed"
                );
                return Ok(NotaryDecision::Conflict {
                    consumed,
                    consumed_by: *consumed_by,
                });
            }
        }

        state.sequence += 1;
        let sequence = state.sequence;
        let committed = CommittedTransition {
            id,
            proposal: proposal.clone(),
            attestation: Attestation {
                authority: self.signer.identity().clone(),
                sequence,
                signature: self.signer.sign(&Attestation::signing_bytes(&id, sequence)),
            },
            committed_at: Utc::now(),
        };

        match input {
            Some(consumed) => {
                state.consumed.insert(consumed, id);
            }
            None => {
                state.created.insert(committed.linear_id(), id);
            }
        }
        state.committed.insert(id, committed.clone());

        info!(
            transition = %id,
            linear_id = %committed.linear_id(),
            sequence,
            "transition committed"
        );
        Ok(NotaryDecision::Committed(committed))
    }
}
