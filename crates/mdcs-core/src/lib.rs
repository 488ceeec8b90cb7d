// File: `crates/mdcs-core/src/lib.rs`
pub mod context;
pub mod contract;
pub mod dot;
pub mod gcounter;
pub mod ids;
pub mod ordset;
pub mod policy;

pub use context::Context;
pub use contract::{ContractError, ContractResult, CrdtContract};
pub use dot::Dot;
pub use gcounter::{GCounter, Increment};
pub use ids::{CrdtId, ReplicaId};
pub use ordset::OrdSet;
pub use policy::ReplicaPolicy;
