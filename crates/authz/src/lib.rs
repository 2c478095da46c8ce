//! authz: group and user authorization over a relational fact store.
//!
//! This crate re-exports the authz components for convenience:
//!
//! - [`core`]: subjects, facts, the fixed model and domain entities
//! - [`storage`]: the fact store trait with SQL and in-memory backends
//! - [`acl`]: the policy engine, reconciliation and the group authorizer
//!
//! The `cli` feature adds the command implementations behind the `authz`
//! binary.

pub use authz_acl as acl;
pub use authz_core as core;
pub use authz_storage as storage;

#[cfg(feature = "cli")]
pub use authz_cli as cli;

pub use authz_acl::{GroupAuthorizer, PolicyEngine, Reconciler};
pub use authz_core::{Fact, Group, Permission, Subject, User};
pub use authz_storage::{FactStore, MemoryFactStore, SqlFactStore};
