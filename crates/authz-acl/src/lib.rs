//! # authz-acl
//!
//! Access control for authz.
//!
//! This crate implements the authorization layer on top of the fact store:
//! - [`PolicyEngine`]: a `casbin` enforcer over the fixed [`MODEL`], with
//!   mutations persisted through the fact store
//! - [`RefreshTask`]: periodic reload of the fact base from storage
//! - [`Reconciler`]: converging a group's grants and members to a desired set
//! - [`GroupAuthorizer`]: group- and user-level authorization operations

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod enforcement;
pub mod error;
pub mod lock;
pub mod reconcile;
pub mod refresh;
pub mod service;

pub use enforcement::{MODEL, PolicyEngine, ReloadOutcome};
pub use error::{Error, Result};
pub use lock::{GroupGuard, GroupLocks};
pub use reconcile::{MembershipDiff, ReconcileReport, Reconciler};
pub use refresh::{RefreshConfig, RefreshStats, RefreshTask};
pub use service::GroupAuthorizer;
