//! Utility modules for the company identity resolver
//!
//! Small, dependency-light helpers shared across the services.

pub mod jitter;
pub mod temporary_id;

pub use temporary_id::{TemporaryIdGenerator, generate_temp_id};
