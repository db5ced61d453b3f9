//! Accord protocol runs.
//!
//! A run takes one requested mutation of a shared todo record from local
//! intent to a committed transition recorded by every participant:
//!
//! 1. [`ProposalBuilder`] derives a proposal from the local vault.
//! 2. The contract is checked and the initiator signs.
//! 3. [`SignatureCollector`] gathers the remaining quorum over sessions.
//! 4. [`FinalityCoordinator`] submits to the ordering authority, applies the
//!    result locally and distributes it.
//!
//! [`PartyNode`] wires these together behind `propose_create`,
//! `propose_complete` and `query`; [`Responder`] is the counterparty side.

#![deny(unsafe_code)]

pub mod builder;
pub mod collector;
pub mod config;
pub mod directory;
mod error;
pub mod events;
pub mod finality;
pub mod node;
pub mod responder;
pub mod sim;
pub mod telemetry;
pub mod transport;

pub use builder::{ProposalBuilder, ProposalRequest};
pub use collector::{SessionState, SignatureCollector};
pub use config::{FlowConfig, LoggingConfig, NodeConfig, VaultConfig};
pub use directory::{DirectoryError, IdentityDirectory, MapDirectory, NetworkMap};
pub use error::{ErrorKind, FlowError, FlowResult};
pub use events::{ProgressBus, ProgressEvent, ProgressStep};
pub use finality::FinalityCoordinator;
pub use node::{NodeServices, PartyNode};
pub use responder::{Refusal, Responder};
pub use sim::SimNetwork;
pub use transport::{
    InMemoryNetwork, IncomingSession, NetworkEndpoint, Session, SessionMessage, SessionTransport,
    TransportError,
};
