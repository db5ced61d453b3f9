//! Counterparty side of the protocol.
//!
//! Serves incoming sessions: countersigns proposals that pass independent
//! verification, and records committed transitions that carry a valid
//! attestation and full quorum. Every refusal goes back to the initiator as a
//! typed `Rejected` message.

use std::fmt;
use std::sync::Arc;

use accord_contract::TodoContract;
use accord_crypto::{verify_transition, SigningService};
use accord_notary::{check_quorum, verify_attestation};
use accord_types::{
    CommittedTransition, Party, PartySignature, Proposal, Quorum, RecordRef, TransitionId,
};
use accord_vault::{ApplyOutcome, RecordStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::directory::IdentityDirectory;
use crate::transport::{IncomingSession, SessionMessage};

/// Why a proposal was not countersigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Refusal {
    Invalid(String),
    /// The input version is already consumed locally; the initiator lost a
    /// race and should rebuild from the current record.
    Consumed {
        consumed: RecordRef,
        consumed_by: TransitionId,
    },
}

impl Refusal {
    fn into_message(self) -> SessionMessage {
        match self {
            Refusal::Invalid(reason) => SessionMessage::Rejected { reason },
            Refusal::Consumed {
                consumed,
                consumed_by,
            } => SessionMessage::Consumed {
                consumed,
                consumed_by,
            },
        }
    }
}

impl From<String> for Refusal {
    fn from(reason: String) -> Self {
        Refusal::Invalid(reason)
    }
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::Invalid(reason) => f.write_str(reason),
            Refusal::Consumed {
                consumed,
                consumed_by,
            } => write!(f, "version {consumed} already consumed by {consumed_by}"),
        }
    }
}

#[derive(Clone)]
pub struct Responder {
    signer: Arc<dyn SigningService>,
    directory: Arc<dyn IdentityDirectory>,
    store: Arc<dyn RecordStore>,
}

impl Responder {
    pub fn new(
        signer: Arc<dyn SigningService>,
        directory: Arc<dyn IdentityDirectory>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            signer,
            directory,
            store,
        }
    }

    fn me(&self) -> &Party {
        self.signer.identity()
    }

    /// Serve `inbox` until the network drops it; one task per session.
    pub fn spawn(self, mut inbox: mpsc::Receiver<IncomingSession>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(incoming) = inbox.recv().await {
                let responder = self.clone();
                tokio::spawn(async move { responder.handle(incoming).await });
            }
            debug!(party = %self.me(), "responder inbox closed");
        })
    }

    pub async fn handle(&self, incoming: IncomingSession) {
        let IncomingSession {
            initiator,
            mut session,
        } = incoming;

        while let Ok(message) = session.receive().await {
            let reply = match message {
                SessionMessage::Propose(proposal) => match self.review(&initiator, &proposal) {
                    Ok(signature) => SessionMessage::Signed(signature),
                    Err(refusal) => {
                        warn!(party = %self.me(), %initiator, %refusal, "refusing to sign");
                        refusal.into_message()
                    }
                },
                SessionMessage::Commit(committed) => match self.accept(&committed).await {
                    Ok(()) => SessionMessage::Ack,
                    Err(reason) => {
                        warn!(party = %self.me(), %initiator, %reason, "refusing commit");
                        SessionMessage::Rejected { reason }
                    }
                },
                other => {
                    warn!(party = %self.me(), %initiator, got = other.name(), "unexpected message");
                    break;
                }
            };
            if session.send(reply).await.is_err() {
                break;
            }
        }
    }

    /// Independent verification before countersigning.
    ///
    /// A consumed input must be exactly the version this party recorded, and
    /// a create must introduce a `linear_id` this party has never seen.
    pub fn review(&self, initiator: &Party, proposal: &Proposal) -> Result<PartySignature, Refusal> {
        let id = proposal.id().map_err(|e| e.to_string())?;
        let quorum = Quorum::for_proposal(proposal);

        if !quorum.contains(self.me()) {
            return Err(format!("{} is not a required signer", self.me()).into());
        }
        if !quorum.contains(initiator) {
            return Err(format!("initiator {initiator} is not a participant").into());
        }
        match proposal.signature_of(initiator) {
            Some(sig) if verify_transition(&id, sig) => {}
            _ => return Err(format!("missing or invalid signature from {initiator}").into()),
        }
        if let Some(bad) = proposal
            .signatures
            .iter()
            .find(|sig| !verify_transition(&id, sig))
        {
            return Err(format!("invalid signature from {}", bad.party).into());
        }
        TodoContract::verify(proposal).map_err(|v| v.to_string())?;

        match &proposal.input {
            Some(input) => {
                let recorded = self
                    .store
                    .transition(&input.reference.produced_by)
                    .map_err(|e| e.to_string())?;
                match recorded {
                    Some(producer) if producer.output() == *input => {}
                    Some(_) => {
                        return Err(format!(
                            "input {} does not match the recorded version",
                            input.reference
                        )
                        .into())
                    }
                    None => {
                        return Err(format!("input {} is not known here", input.reference).into())
                    }
                }
                let consumed_by = self
                    .store
                    .consumed_by(&input.reference)
                    .map_err(|e| e.to_string())?;
                if let Some(consumed_by) = consumed_by {
                    return Err(Refusal::Consumed {
                        consumed: input.reference,
                        consumed_by,
                    });
                }
            }
            None => {
                let linear_id = proposal.output.linear_id;
                if self
                    .store
                    .latest(&linear_id)
                    .map_err(|e| e.to_string())?
                    .is_some()
                {
                    return Err(format!("record {linear_id} already exists").into());
                }
            }
        }

        info!(party = %self.me(), transition = %id, command = %proposal.command, "countersigned");
        Ok(self.signer.sign_transition(&id))
    }

    /// Verify and record a committed transition sent by a participant.
    pub async fn accept(&self, committed: &CommittedTransition) -> Result<(), String> {
        if !self.directory.is_authority(&committed.attestation.authority) {
            return Err(format!(
                "{} is not a known ordering authority",
                committed.attestation.authority
            ));
        }
        if !verify_attestation(committed) {
            return Err("invalid ordering attestation".to_string());
        }
        check_quorum(&committed.proposal, &committed.id)?;
        TodoContract::verify(&committed.proposal).map_err(|v| v.to_string())?;
        if !committed.proposal.output.is_relevant(self.me()) {
            return Err(format!("{} is not a participant", self.me()));
        }

        match self.store.apply(committed).await.map_err(|e| e.to_string())? {
            ApplyOutcome::Applied => {
                info!(party = %self.me(), transition = %committed.id, "recorded committed transition")
            }
            ApplyOutcome::AlreadyApplied => {
                debug!(party = %self.me(), transition = %committed.id, "already recorded")
            }
        }
        Ok(())
    }
}
