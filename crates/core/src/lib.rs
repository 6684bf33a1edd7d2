//! `pktracker-core` — domain building blocks shared by every crate.
//!
//! This crate contains **pure domain** primitives (no HTTP, no storage).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod page;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::{DomainError, DomainResult};
pub use id::{PermissionId, RoleId, TokenId, UserId};
pub use page::{Page, PageRequest};
