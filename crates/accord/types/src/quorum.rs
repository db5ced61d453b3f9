use std::collections::BTreeSet;

use crate::{Party, Proposal};

/// Required-signer set for one proposal.
///
/// Computed once per protocol run: the participants of the output version
/// together with the participants of the consumed input version, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quorum {
    required: BTreeSet<Party>,
}

impl Quorum {
    pub fn for_proposal(proposal: &Proposal) -> Self {
        let mut required = proposal.output.participants();
        if let Some(input) = &proposal.input {
            required.extend(input.record.participants());
        }
        Self { required }
    }

    pub fn required(&self) -> &BTreeSet<Party> {
        &self.required
    }

    pub fn contains(&self, party: &Party) -> bool {
        self.required.contains(party)
    }

    /// Required signers not yet represented in `proposal.signatures`.
    pub fn missing(&self, proposal: &Proposal) -> Vec<Party> {
        self.required
            .iter()
            .filter(|party| !proposal.is_signed_by(party))
            .cloned()
            .collect()
    }

    /// Signers present on `proposal` that are not part of the quorum.
    pub fn extraneous(&self, proposal: &Proposal) -> Vec<Party> {
        proposal
            .signers()
            .filter(|party| !self.required.contains(*party))
            .cloned()
            .collect()
    }

    pub fn is_satisfied(&self, proposal: &Proposal) -> bool {
        self.missing(proposal).is_empty()
    }
}
