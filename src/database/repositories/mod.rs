//! SeaORM repository implementations

pub mod company_name_index;
pub mod deferred_resolution;

pub use company_name_index::CompanyNameIndexSeaOrmRepository;
pub use deferred_resolution::{DeferredResolutionSeaOrmRepository, FailedAttempt};
