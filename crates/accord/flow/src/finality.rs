//! Finality: submit a quorum-signed proposal to the ordering authority and
//! distribute the committed transition to every participant.

use accord_notary::{NotaryDecision, OrderingAuthority};
use accord_types::{CommittedTransition, Party, Proposal};
use accord_vault::RecordStore;
use futures::future::join_all;
use tracing::{info, warn};

use crate::events::{ProgressBus, ProgressEvent};
use crate::transport::{SessionMessage, SessionTransport, TransportError};
use crate::{FlowError, FlowResult};

pub struct FinalityCoordinator<'a> {
    me: &'a Party,
    authority: &'a dyn OrderingAuthority,
    store: &'a dyn RecordStore,
    transport: &'a dyn SessionTransport,
    events: &'a ProgressBus,
}

impl<'a> FinalityCoordinator<'a> {
    pub fn new(
        me: &'a Party,
        authority: &'a dyn OrderingAuthority,
        store: &'a dyn RecordStore,
        transport: &'a dyn SessionTransport,
        events: &'a ProgressBus,
    ) -> Self {
        Self {
            me,
            authority,
            store,
            transport,
            events,
        }
    }

    /// Runs to a terminal outcome once submitted.
    ///
    /// The local store is touched only after the authority commits. After
    /// that the commit stands: a failed local apply and peers that fail to
    /// acknowledge are reported through the log and the event stream, and
    /// distribution always runs.
    pub async fn finalize(&self, proposal: &Proposal) -> FlowResult<CommittedTransition> {
        let committed = match self.authority.submit(proposal).await? {
            NotaryDecision::Committed(committed) => committed,
            NotaryDecision::Conflict {
                consumed,
                consumed_by,
            } => {
                warn!(%consumed, %consumed_by, "lost ordering race");
                return Err(FlowError::Conflict {
                    consumed,
                    consumed_by,
                });
            }
            NotaryDecision::Rejected { reason } => {
                warn!(%reason, "ordering authority rejected proposal");
                return Err(FlowError::Rejected(reason));
            }
        };

        if committed.proposal.output.is_relevant(self.me) {
            if let Err(e) = self.store.apply(&committed).await {
                warn!(
                    transition = %committed.id,
                    error = %e,
                    "committed transition not recorded locally"
                );
                self.events.emit(ProgressEvent::RecordFailed {
                    transition: committed.id,
                    reason: e.to_string(),
                });
            }
        }
        info!(
            transition = %committed.id,
            linear_id = %committed.linear_id(),
            sequence = committed.attestation.sequence,
            "transition finalized"
        );
        self.events.emit(ProgressEvent::Committed {
            transition: committed.id,
            linear_id: committed.linear_id(),
        });

        self.distribute(&committed).await;
        Ok(committed)
    }

    async fn distribute(&self, committed: &CommittedTransition) {
        let recipients: Vec<Party> = committed
            .proposal
            .output
            .participants()
            .into_iter()
            .filter(|p| p != self.me)
            .collect();

        let outcomes = join_all(recipients.iter().map(|p| self.deliver(p, committed))).await;
        for (party, outcome) in recipients.into_iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(%party, transition = %committed.id, error = %e, "distribution failed");
                self.events.emit(ProgressEvent::DistributionFailed {
                    party,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn deliver(&self, party: &Party, committed: &CommittedTransition) -> FlowResult<()> {
        let mut session = self.transport.open_session(party).await?;
        session
            .send(SessionMessage::Commit(committed.clone()))
            .await?;
        match session.receive().await? {
            SessionMessage::Ack => Ok(()),
            SessionMessage::Rejected { reason } => Err(FlowError::CounterpartyRejected {
                party: party.clone(),
                reason,
            }),
            other => Err(TransportError::UnexpectedMessage {
                party: party.name.clone(),
                got: other.name(),
            }
            .into()),
        }
    }
}
