//! authz core: shared types, errors and the fixed authorization model.
//!
//! This crate provides the foundational types used across all authz crates.
//! It has no internal authz dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`subject`]: Namespacing of user, group and permission ids
//! - [`fact`]: Typed policy facts and their textual line form
//! - [`facts`]: The in-memory fact set and the fixed-model evaluator
//! - [`model`]: Domain entities (organizations, users, groups, permissions)
//! - [`repository`]: Lookup of domain entities by id
//! - [`service`]: Lifecycle state for background services

#![forbid(unsafe_code)]

pub mod error;
pub mod fact;
pub mod facts;
pub mod model;
pub mod repository;
pub mod service;
pub mod subject;

// Re-export key types at crate root for convenience
pub use error::{Error, Result};
pub use fact::{Fact, FactKind, PolicyFact, RoleFact};
pub use facts::FactSet;
pub use model::{Group, Organization, Permission, User};
pub use repository::{Entity, MemoryRepository, Repository};
pub use service::{ServiceHandle, ServiceState};
pub use subject::{Subject, SubjectKind, has_kind, id_from, subject_for};
