use accord_types::{Command, LinearId, Party, Proposal, Record, TodoItem};
use accord_vault::RecordStore;
use tracing::debug;

use crate::{FlowError, FlowResult};

/// What the caller wants done.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProposalRequest {
    /// New record owned by the initiator.
    Create { payload: TodoItem, assignee: Party },
    /// Mark the current version of `linear_id` complete.
    Complete { linear_id: LinearId },
}

impl ProposalRequest {
    pub fn command(&self) -> Command {
        match self {
            ProposalRequest::Create { .. } => Command::Create,
            ProposalRequest::Complete { .. } => Command::Complete,
        }
    }
}

/// Builds unsigned proposals from local state.
pub struct ProposalBuilder<'a> {
    me: &'a Party,
    store: &'a dyn RecordStore,
}

impl<'a> ProposalBuilder<'a> {
    pub fn new(me: &'a Party, store: &'a dyn RecordStore) -> Self {
        Self { me, store }
    }

    /// Fails fast with `NotFound` or `AlreadyComplete` before anything
    /// leaves this party.
    pub fn build(&self, request: ProposalRequest) -> FlowResult<Proposal> {
        match request {
            ProposalRequest::Create { payload, assignee } => {
                let record = Record::create(payload, self.me.clone(), assignee);
                debug!(linear_id = %record.linear_id, "built create proposal");
                Ok(Proposal::new(Command::Create, None, record))
            }
            ProposalRequest::Complete { linear_id } => {
                let current = self
                    .store
                    .latest(&linear_id)?
                    .ok_or_else(|| FlowError::NotFound(format!("record {linear_id}")))?;
                if current.record.is_complete() {
                    return Err(FlowError::AlreadyComplete(linear_id));
                }
                let output = current.record.derive(current.record.payload.completed());
                debug!(%linear_id, input = %current.reference, "built complete proposal");
                Ok(Proposal::new(Command::Complete, Some(current), output))
            }
        }
    }
}
