use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LinearId, Party, Proposal, RecordAndRef, RecordRef, Signature, TransitionId};

const ATTESTATION_DOMAIN: &[u8] = b"accord-attestation-v1:";

/// Ordering-authority proof that a transition was the unique mutation applied
/// to its input version at sequence position `sequence`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub authority: Party,
    pub sequence: u64,
    pub signature: Signature,
}

impl Attestation {
    /// Bytes the authority signs for `(id, sequence)`.
    pub fn signing_bytes(id: &TransitionId, sequence: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(ATTESTATION_DOMAIN.len() + 32 + 8);
        out.extend_from_slice(ATTESTATION_DOMAIN);
        out.extend_from_slice(id.as_bytes());
        out.extend_from_slice(&sequence.to_le_bytes());
        out
    }
}

/// Immutable result of a successful finalization.
///
/// Identified by the content hash of its proposal; never mutated after the
/// ordering authority issues it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTransition {
    pub id: TransitionId,
    pub proposal: Proposal,
    pub attestation: Attestation,
    pub committed_at: DateTime<Utc>,
}

impl CommittedTransition {
    pub fn linear_id(&self) -> LinearId {
        self.proposal.output.linear_id
    }

    /// Reference of the version this transition consumed.
    pub fn input_ref(&self) -> Option<RecordRef> {
        self.proposal.input.as_ref().map(|input| input.reference)
    }

    /// Reference of the version this transition produced.
    pub fn output_ref(&self) -> RecordRef {
        RecordRef {
            linear_id: self.linear_id(),
            produced_by: self.id,
        }
    }

    pub fn output(&self) -> RecordAndRef {
        RecordAndRef {
            record: self.proposal.output.clone(),
            reference: self.output_ref(),
        }
    }
}
