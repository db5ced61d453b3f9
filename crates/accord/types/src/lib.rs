#![deny(unsafe_code)]
//! # accord-types
//!
//! Shared vocabulary for the Accord record-mutation protocol.
//!
//! A *linear record* is a unit of shared work jointly controlled by its
//! participants. Every mutation produces a new version; versions are linked by
//! a stable [`LinearId`] and each version is identified by the transition that
//! produced it ([`RecordRef`]).
//!
//! ```text
//! Proposal (unsigned) → Proposal (quorum signed) → CommittedTransition
//! ```
//!
//! ## Key Types
//!
//! - [`Record`] / [`TodoItem`]: the versioned entity and its payload
//! - [`Proposal`]: an unpublished candidate mutation with collected signatures
//! - [`CommittedTransition`]: the attested, immutable result of finalization
//! - [`Quorum`]: required-signer computation for a proposal
//! - [`ContentHash`]: BLAKE3 content-addressed identifier

pub mod error;
pub mod ids;
pub mod party;
pub mod proposal;
pub mod quorum;
pub mod record;
pub mod transition;

pub use error::TypesError;
pub use ids::{ContentHash, LinearId, TransitionId};
pub use party::{Party, PartySignature, PublicKey, Signature};
pub use proposal::{contract_reference, Command, Proposal, CONTRACT_TEMPLATE};
pub use quorum::Quorum;
pub use record::{Record, RecordAndRef, RecordRef, TodoItem};
pub use transition::{Attestation, CommittedTransition};
