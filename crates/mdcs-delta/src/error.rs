//! Error taxonomy for the replica state machine and its component log.

use mdcs_core::ContractError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicaError {
    #[error("invalid replica id")]
    InvalidId,

    #[error("invalid dot")]
    InvalidDot,

    #[error("invalid meta value")]
    InvalidMeta,

    #[error("crdt {0} already bound")]
    AlreadyExists(String),

    #[error("crdt {0} not found")]
    CrdtNotFound(String),

    #[error("implementation for type {type_tag} missing operations: {missing:?}")]
    ImplementationMissing {
        type_tag: String,
        missing: Vec<String>,
    },

    #[error("duplicate log entry for crdt {crdt_id} origin {origin} counter {counter}")]
    Duplicate {
        crdt_id: String,
        origin: String,
        counter: u64,
    },

    #[error("crdt operation failed: {0}")]
    Crdt(#[from] ContractError),
}

pub type Result<T> = std::result::Result<T, ReplicaError>;
