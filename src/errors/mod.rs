//! Centralized error handling for the company identity resolver
//!
//! Errors are grouped by layer so each component can report failures in its own
//! vocabulary while the resolver decides which of them degrade to the next tier
//! and which are fatal.
//!
//! # Error Categories
//!
//! - **Repository Errors**: cache and queue table access through SeaORM
//! - **Lookup Errors**: the external EQC lookup service and its transport
//! - **Queue Errors**: deferred resolution lifecycle violations
//! - **Resolution Errors**: the top-level batch failures surfaced to callers
//!
//! # Usage
//!
//! ```rust
//! use company_id_resolver::errors::{ResolutionError, ResolutionResult};
//!
//! fn example_function() -> ResolutionResult<String> {
//!     Err(ResolutionError::configuration("salt must not be empty"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using ResolutionError
pub type ResolutionResult<T> = Result<T, ResolutionError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Convenience type alias for external lookup Results
pub type LookupResult<T> = Result<T, LookupError>;

/// Convenience type alias for deferred queue Results
pub type QueueResult<T> = Result<T, QueueError>;
