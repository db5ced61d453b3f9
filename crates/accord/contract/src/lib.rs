//! Todo contract verifier.
//!
//! [`TodoContract::verify`] is a pure predicate over a [`Proposal`]. Every
//! participant evaluates it independently before signing; the ordering
//! authority never interprets payloads, so this is the only check standing
//! between a malicious or buggy proposal and the ledger.

#![deny(unsafe_code)]

use accord_types::{contract_reference, Command, Proposal, Quorum};
use thiserror::Error;

/// Why a proposal fails the contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("proposal references an unknown contract")]
    UnknownContract,

    #[error("{command} must not consume an input")]
    UnexpectedInput { command: Command },

    #[error("{command} must consume exactly one input")]
    MissingInput { command: Command },

    #[error("new records must start incomplete")]
    CreatedComplete,

    #[error("input record is already complete")]
    InputAlreadyComplete,

    #[error("output record must be complete")]
    OutputNotComplete,

    #[error("{field} must not change between versions")]
    IdentityChanged { field: &'static str },

    #[error("only the completion flag may change: {field} differs")]
    PayloadChanged { field: &'static str },

    #[error("input reference does not match the input record")]
    InputReferenceMismatch,

    #[error("signature from non-participant {party}")]
    UnexpectedSigner { party: String },
}

/// Rules for the todo record lifecycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TodoContract;

impl TodoContract {
    pub fn verify(proposal: &Proposal) -> Result<(), ContractViolation> {
        require(
            proposal.contract == contract_reference(),
            ContractViolation::UnknownContract,
        )?;

        let quorum = Quorum::for_proposal(proposal);
        if let Some(party) = quorum.extraneous(proposal).into_iter().next() {
            return Err(ContractViolation::UnexpectedSigner { party: party.name });
        }

        match proposal.command {
            Command::Create => Self::verify_create(proposal),
            Command::Complete => Self::verify_complete(proposal),
        }
    }

    fn verify_create(proposal: &Proposal) -> Result<(), ContractViolation> {
        require(
            proposal.input.is_none(),
            ContractViolation::UnexpectedInput {
                command: Command::Create,
            },
        )?;
        require(
            !proposal.output.payload.complete,
            ContractViolation::CreatedComplete,
        )
    }

    fn verify_complete(proposal: &Proposal) -> Result<(), ContractViolation> {
        let input = proposal
            .input
            .as_ref()
            .ok_or(ContractViolation::MissingInput {
                command: Command::Complete,
            })?;
        let before = &input.record;
        let after = &proposal.output;

        require(
            input.reference.linear_id == before.linear_id,
            ContractViolation::InputReferenceMismatch,
        )?;
        require(
            !before.payload.complete,
            ContractViolation::InputAlreadyComplete,
        )?;
        require(after.payload.complete, ContractViolation::OutputNotComplete)?;

        require(
            after.linear_id == before.linear_id,
            ContractViolation::IdentityChanged { field: "linear_id" },
        )?;
        require(
            after.owner == before.owner,
            ContractViolation::IdentityChanged { field: "owner" },
        )?;
        require(
            after.assignee == before.assignee,
            ContractViolation::IdentityChanged { field: "assignee" },
        )?;

        require(
            after.payload.title == before.payload.title,
            ContractViolation::PayloadChanged { field: "title" },
        )?;
        require(
            after.payload.description == before.payload.description,
            ContractViolation::PayloadChanged {
                field: "description",
            },
        )
    }
}

fn require(condition: bool, violation: ContractViolation) -> Result<(), ContractViolation> {
    if condition {
        Ok(())
    } else {
        Err(violation)
    }
}
