//! Accord vault: each party's local index of the records it participates in.
//!
//! The vault answers "what is the current version of record X" and "which
//! current records match this predicate". Mutation happens only through
//! [`RecordStore::apply`], one committed transition at a time, under a
//! per-`linear_id` lock so readers never observe a consumed input without its
//! replacement.

#![deny(unsafe_code)]

mod error;
pub mod journal;
mod query;
mod store;

pub use error::{VaultError, VaultResult};
pub use query::{CurrentRecords, RecordQuery};
pub use store::{ApplyOutcome, RecordStore, Vault};
