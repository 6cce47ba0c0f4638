//! Repository abstractions for the resolution cache
//!
//! The resolver, the external provider and the deferred queue all write to the
//! same cache. They depend on the `ResolutionCache` trait rather than on the
//! SeaORM implementation so tiers can be exercised against a mock store.
//!
//! # Usage
//!
//! ```rust,no_run
//! use company_id_resolver::repositories::ResolutionCache;
//!
//! async fn example(cache: &dyn ResolutionCache) -> Result<(), Box<dyn std::error::Error>> {
//!     if let Some(entry) = cache.lookup("中国平安").await? {
//!         println!("cached id {}", entry.company_id);
//!     }
//!     Ok(())
//! }
//! ```

pub mod traits;

pub use traits::*;
