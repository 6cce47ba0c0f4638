pub use super::company_name_index::Entity as CompanyNameIndex;
pub use super::deferred_resolutions::Entity as DeferredResolutions;
