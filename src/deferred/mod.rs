//! Deferred resolution subsystem
//!
//! Names the hot path could not resolve are parked in a durable backlog and
//! retried outside any single run:
//! - `DeferredResolutionQueue`: lifecycle and backoff over the `deferred_resolutions` table
//! - `DeferredResolutionWorker`: long-lived polling loop that drains due entries

pub mod queue;
pub mod worker;

pub use queue::DeferredResolutionQueue;
pub use worker::{DeferredResolutionWorker, PassSummary};
