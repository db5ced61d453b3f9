//! Point-to-point sessions between parties.
//!
//! A session is an ordered, reliable, bidirectional message stream between an
//! initiator and one counterparty. [`InMemoryNetwork`] implements it with
//! tokio channels; each registered party receives new sessions on an inbox
//! served by its responder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use accord_types::{CommittedTransition, Party, PartySignature, Proposal, RecordRef, TransitionId};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

const SESSION_BUFFER: usize = 16;
const INBOX_BUFFER: usize = 64;

/// Messages exchanged within a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMessage {
    /// Initiator asks the counterparty to verify and countersign.
    Propose(Proposal),
    Signed(PartySignature),
    /// Typed refusal; the session stays well-formed.
    Rejected { reason: String },
    /// The counterparty has already recorded a transition consuming the
    /// proposal's input.
    Consumed {
        consumed: RecordRef,
        consumed_by: TransitionId,
    },
    /// Initiator distributes a finalized transition.
    Commit(CommittedTransition),
    Ack,
}

impl SessionMessage {
    pub fn name(&self) -> &'static str {
        match self {
            SessionMessage::Propose(_) => "propose",
            SessionMessage::Signed(_) => "signed",
            SessionMessage::Rejected { .. } => "rejected",
            SessionMessage::Consumed { .. } => "consumed",
            SessionMessage::Commit(_) => "commit",
            SessionMessage::Ack => "ack",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0} is unreachable")]
    Unreachable(String),

    #[error("session with {0} closed")]
    SessionClosed(String),

    #[error("unexpected {got} message from {party}")]
    UnexpectedMessage { party: String, got: &'static str },
}

#[async_trait]
pub trait Session: Send {
    fn counterparty(&self) -> &Party;

    async fn send(&mut self, message: SessionMessage) -> Result<(), TransportError>;

    async fn receive(&mut self) -> Result<SessionMessage, TransportError>;
}

#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn open_session(&self, party: &Party) -> Result<Box<dyn Session>, TransportError>;
}

/// A session opened by someone else, as delivered to the counterparty.
pub struct IncomingSession {
    pub initiator: Party,
    pub session: Box<dyn Session>,
}

/// One end of an in-memory session.
pub struct ChannelSession {
    counterparty: Party,
    tx: mpsc::Sender<SessionMessage>,
    rx: mpsc::Receiver<SessionMessage>,
}

impl ChannelSession {
    /// Two connected ends; the first talks to `b`, the second to `a`.
    fn pair(a: Party, b: Party) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(SESSION_BUFFER);
        let (b_tx, a_rx) = mpsc::channel(SESSION_BUFFER);
        (
            Self {
                counterparty: b,
                tx: a_tx,
                rx: a_rx,
            },
            Self {
                counterparty: a,
                tx: b_tx,
                rx: b_rx,
            },
        )
    }
}

#[async_trait]
impl Session for ChannelSession {
    fn counterparty(&self) -> &Party {
        &self.counterparty
    }

    async fn send(&mut self, message: SessionMessage) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::SessionClosed(self.counterparty.name.clone()))
    }

    async fn receive(&mut self) -> Result<SessionMessage, TransportError> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| TransportError::SessionClosed(self.counterparty.name.clone()))
    }
}

/// In-process network of party inboxes.
#[derive(Default)]
pub struct InMemoryNetwork {
    inboxes: DashMap<String, mpsc::Sender<IncomingSession>>,
    sessions_opened: AtomicU64,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach `party` and return the inbox its responder must drain.
    pub fn register(&self, party: &Party) -> mpsc::Receiver<IncomingSession> {
        let (tx, rx) = mpsc::channel(INBOX_BUFFER);
        self.inboxes.insert(party.name.clone(), tx);
        rx
    }

    /// Detach `name`; later sessions to it fail as unreachable.
    pub fn disconnect(&self, name: &str) {
        self.inboxes.remove(name);
    }

    /// Session attempts made so far, successful or not.
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Transport handle that opens sessions as `local`.
    pub fn endpoint(self: &Arc<Self>, local: Party) -> NetworkEndpoint {
        NetworkEndpoint {
            network: Arc::clone(self),
            local,
        }
    }
}

/// [`SessionTransport`] for one party on an [`InMemoryNetwork`].
#[derive(Clone)]
pub struct NetworkEndpoint {
    network: Arc<InMemoryNetwork>,
    local: Party,
}

#[async_trait]
impl SessionTransport for NetworkEndpoint {
    async fn open_session(&self, party: &Party) -> Result<Box<dyn Session>, TransportError> {
        self.network.sessions_opened.fetch_add(1, Ordering::SeqCst);

        let inbox = self
            .network
            .inboxes
            .get(&party.name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::Unreachable(party.name.clone()))?;

        let (ours, theirs) = ChannelSession::pair(self.local.clone(), party.clone());
        inbox
            .send(IncomingSession {
                initiator: self.local.clone(),
                session: Box::new(theirs),
            })
            .await
            .map_err(|_| TransportError::Unreachable(party.name.clone()))?;

        debug!(from = %self.local, to = %party, "session opened");
        Ok(Box::new(ours))
    }
}
