//! # authz-storage
//!
//! Durable storage for the policy engine's fact base.
//!
//! Every fact is flattened into one fixed-width row `(kind, field0..field5)`
//! of a single relational table. This crate provides:
//! - The [`FactStore`] abstraction the engine persists through
//! - [`SqlFactStore`] over a `sqlx` pool (PostgreSQL or SQLite)
//! - [`MemoryFactStore`] (for testing)
//! - [`FactAdapter`], the `casbin` adapter over any fact store
//! - Row codec and conjunctive row filters

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod adapter;
pub mod database;
pub mod error;
pub mod filter;
pub mod memory;
pub mod row;
pub mod traits;

pub use adapter::{FactAdapter, storage_error};
pub use database::{DEFAULT_TABLE, SqlFactStore};
pub use error::{Error, Result};
pub use filter::{FactFilter, FilteredFacts};
pub use memory::MemoryFactStore;
pub use row::{FIELD_COUNT, FactRow};
pub use traits::FactStore;
