//! Signature collection: drives a proposal from locally signed to quorum
//! signed.
//!
//! One session per missing counterparty, run concurrently. Each session is a
//! small state machine:
//!
//! ```text
//! Sent -> AwaitingSignature -> Signed | Rejected | TransportFailed
//!   \-> TransportFailed
//! ```
//!
//! The first failing session aborts the whole collection; the others are
//! dropped, which closes their sessions.

use accord_crypto::verify_transition;
use accord_types::{Party, PartySignature, Proposal, Quorum, TransitionId};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::events::{ProgressBus, ProgressEvent};
use crate::transport::{SessionMessage, SessionTransport, TransportError};
use crate::{FlowError, FlowResult};

/// Per-counterparty session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Sent,
    AwaitingSignature,
    Signed,
    Rejected,
    TransportFailed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Signed | SessionState::Rejected | SessionState::TransportFailed
        )
    }

    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Sent, AwaitingSignature)
                | (Sent, TransportFailed)
                | (AwaitingSignature, Signed)
                | (AwaitingSignature, Rejected)
                | (AwaitingSignature, TransportFailed)
        )
    }
}

struct Tracker<'a> {
    counterparty: &'a Party,
    state: Option<SessionState>,
    events: &'a ProgressBus,
}

impl Tracker<'_> {
    fn enter(&mut self, next: SessionState) {
        debug_assert!(
            self.state.map_or(true, |s| s.can_advance_to(next)),
            "illegal session transition {:?} -> {next:?}",
            self.state
        );
        self.state = Some(next);
        debug!(counterparty = %self.counterparty, state = ?next, "signature session");
        self.events.emit(ProgressEvent::Session {
            counterparty: self.counterparty.clone(),
            state: next,
        });
    }
}

pub struct SignatureCollector<'a> {
    transport: &'a dyn SessionTransport,
    events: &'a ProgressBus,
}

impl<'a> SignatureCollector<'a> {
    pub fn new(transport: &'a dyn SessionTransport, events: &'a ProgressBus) -> Self {
        Self { transport, events }
    }

    /// Gather a signature from every required participant not yet
    /// represented in `proposal.signatures`.
    pub async fn collect(&self, mut proposal: Proposal) -> FlowResult<Proposal> {
        let id = proposal.id()?;
        let quorum = Quorum::for_proposal(&proposal);
        let missing = quorum.missing(&proposal);

        if !missing.is_empty() {
            info!(transition = %id, counterparties = missing.len(), "collecting signatures");
        }

        let signatures = try_join_all(
            missing
                .iter()
                .map(|party| self.exchange(party, &proposal, &id)),
        )
        .await?;
        for signature in signatures {
            proposal.add_signature(signature);
        }

        if !quorum.is_satisfied(&proposal) {
            let still = quorum.missing(&proposal);
            return Err(FlowError::Validation(format!(
                "quorum incomplete, missing {}",
                still
                    .iter()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok(proposal)
    }

    async fn exchange(
        &self,
        party: &Party,
        proposal: &Proposal,
        id: &TransitionId,
    ) -> FlowResult<PartySignature> {
        let mut tracker = Tracker {
            counterparty: party,
            state: None,
            events: self.events,
        };

        let sent = async {
            let mut session = self.transport.open_session(party).await?;
            session
                .send(SessionMessage::Propose(proposal.clone()))
                .await?;
            Ok::<_, TransportError>(session)
        };
        let mut session = match sent.await {
            Ok(session) => session,
            Err(e) => {
                tracker.enter(SessionState::TransportFailed);
                return Err(e.into());
            }
        };
        tracker.enter(SessionState::Sent);
        tracker.enter(SessionState::AwaitingSignature);

        match session.receive().await {
            Ok(SessionMessage::Signed(signature)) => {
                if signature.party != *party || !verify_transition(id, &signature) {
                    tracker.enter(SessionState::Rejected);
                    warn!(counterparty = %party, "invalid countersignature");
                    return Err(FlowError::Validation(format!(
                        "invalid signature returned by {party}"
                    )));
                }
                tracker.enter(SessionState::Signed);
                Ok(signature)
            }
            Ok(SessionMessage::Rejected { reason }) => {
                tracker.enter(SessionState::Rejected);
                warn!(counterparty = %party, %reason, "proposal rejected by counterparty");
                Err(FlowError::CounterpartyRejected {
                    party: party.clone(),
                    reason,
                })
            }
            Ok(SessionMessage::Consumed {
                consumed,
                consumed_by,
            }) => {
                tracker.enter(SessionState::Rejected);
                info!(counterparty = %party, %consumed, %consumed_by, "input already consumed");
                Err(FlowError::Conflict {
                    consumed,
                    consumed_by,
                })
            }
            Ok(other) => {
                tracker.enter(SessionState::TransportFailed);
                Err(TransportError::UnexpectedMessage {
                    party: party.name.clone(),
                    got: other.name(),
                }
                .into())
            }
            Err(e) => {
                tracker.enter(SessionState::TransportFailed);
                Err(e.into())
            }
        }
    }
}
