//! Party node: the protocol entry points exposed to a presentation layer.

use std::sync::Arc;
use std::time::Duration;

use accord_contract::TodoContract;
use accord_crypto::SigningService;
use accord_notary::OrderingAuthority;
use accord_types::{CommittedTransition, LinearId, Party, TodoItem};
use accord_vault::{CurrentRecords, RecordQuery, RecordStore};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::builder::{ProposalBuilder, ProposalRequest};
use crate::collector::SignatureCollector;
use crate::config::FlowConfig;
use crate::directory::IdentityDirectory;
use crate::events::{ProgressBus, ProgressEvent, ProgressStep};
use crate::finality::FinalityCoordinator;
use crate::responder::Responder;
use crate::transport::{IncomingSession, SessionTransport};
use crate::{FlowError, FlowResult};

/// Collaborators a node is assembled from.
pub struct NodeServices {
    pub signer: Arc<dyn SigningService>,
    pub directory: Arc<dyn IdentityDirectory>,
    pub transport: Arc<dyn SessionTransport>,
    pub authority: Arc<dyn OrderingAuthority>,
    pub store: Arc<dyn RecordStore>,
}

/// One party's view of the protocol.
///
/// Runs are independent: any number may execute concurrently, and runs on
/// different records never coordinate. A run that fails before submission
/// leaves the local store untouched.
pub struct PartyNode {
    signer: Arc<dyn SigningService>,
    directory: Arc<dyn IdentityDirectory>,
    transport: Arc<dyn SessionTransport>,
    authority: Arc<dyn OrderingAuthority>,
    store: Arc<dyn RecordStore>,
    events: ProgressBus,
    collect_timeout: Option<Duration>,
}

impl PartyNode {
    pub fn new(services: NodeServices, config: &FlowConfig) -> Self {
        Self {
            signer: services.signer,
            directory: services.directory,
            transport: services.transport,
            authority: services.authority,
            store: services.store,
            events: ProgressBus::new(config.event_capacity),
            collect_timeout: config.collect_timeout(),
        }
    }

    pub fn whoami(&self) -> &Party {
        self.signer.identity()
    }

    pub fn peers(&self) -> Vec<Party> {
        self.directory.peers()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Start serving counterparty sessions arriving on `inbox`.
    pub fn serve(&self, inbox: mpsc::Receiver<IncomingSession>) -> JoinHandle<()> {
        Responder::new(
            Arc::clone(&self.signer),
            Arc::clone(&self.directory),
            Arc::clone(&self.store),
        )
        .spawn(inbox)
    }

    /// Create a record owned by this party and assigned to `assignee`.
    #[instrument(skip(self, payload), fields(party = %self.whoami()))]
    pub async fn propose_create(
        &self,
        payload: TodoItem,
        assignee: &str,
    ) -> FlowResult<CommittedTransition> {
        let assignee = self.directory.resolve(assignee)?;
        self.run(ProposalRequest::Create { payload, assignee })
            .await
    }

    /// Mark the current version of `linear_id` complete.
    #[instrument(skip(self), fields(party = %self.whoami()))]
    pub async fn propose_complete(&self, linear_id: LinearId) -> FlowResult<CommittedTransition> {
        self.run(ProposalRequest::Complete { linear_id }).await
    }

    /// Build, verify, sign, collect and finalize one proposal.
    pub async fn run(&self, request: ProposalRequest) -> FlowResult<CommittedTransition> {
        let me = self.whoami();

        self.events.step(ProgressStep::Generating);
        let mut proposal = ProposalBuilder::new(me, self.store.as_ref()).build(request)?;

        self.events.step(ProgressStep::Verifying);
        TodoContract::verify(&proposal)?;

        self.events.step(ProgressStep::Signing);
        let id = proposal.id()?;
        proposal.add_signature(self.signer.sign_transition(&id));

        self.events.step(ProgressStep::GatheringSignatures);
        let collector = SignatureCollector::new(self.transport.as_ref(), &self.events);
        let proposal = match self.collect_timeout {
            Some(limit) => tokio::time::timeout(limit, collector.collect(proposal))
                .await
                .map_err(|_| FlowError::Timeout(limit))??,
            None => collector.collect(proposal).await?,
        };

        self.events.step(ProgressStep::Finalising);
        let committed = FinalityCoordinator::new(
            me,
            self.authority.as_ref(),
            self.store.as_ref(),
            self.transport.as_ref(),
            &self.events,
        )
        .finalize(&proposal)
        .await?;

        info!(
            transition = %committed.id,
            linear_id = %committed.linear_id(),
            command = %committed.proposal.command,
            "protocol run committed"
        );
        Ok(committed)
    }

    pub fn query(&self, query: &RecordQuery) -> FlowResult<CurrentRecords> {
        Ok(self.store.current(query)?)
    }

    pub fn todos(&self) -> FlowResult<CurrentRecords> {
        self.query(&RecordQuery::all())
    }

    /// Incomplete records assigned to this party.
    pub fn my_todos(&self) -> FlowResult<CurrentRecords> {
        self.query(&RecordQuery::all().assignee(self.whoami().clone()).complete(false))
    }

    pub fn my_owned_todos(&self) -> FlowResult<CurrentRecords> {
        self.query(&RecordQuery::all().owner(self.whoami().clone()))
    }

    pub fn my_completed_todos(&self) -> FlowResult<CurrentRecords> {
        self.query(&RecordQuery::all().assignee(self.whoami().clone()).complete(true))
    }
}
