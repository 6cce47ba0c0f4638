//! Resolution services
//!
//! - `eqc_provider`: budgeted external lookup with write-through
//! - `override_table`: static exact-match overrides
//! - `company_resolver`: the tiered batch resolver
//! - `enrichment_observer`: per-run counters and unknown-company tracking
//! - `unknown_company_export`: CSV export of names left on temporary ids

pub mod company_resolver;
pub mod enrichment_observer;
pub mod eqc_provider;
pub mod override_table;
pub mod unknown_company_export;

pub use company_resolver::{CompanyIdResolver, DataRow, ResolutionOutput};
pub use enrichment_observer::EnrichmentObserver;
pub use eqc_provider::{EqcProvider, LookupOutcome, ProviderState, ProviderStats, SkipReason};
pub use override_table::OverrideTable;
pub use unknown_company_export::UnknownCompanyExporter;
