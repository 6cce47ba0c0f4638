//! SeaORM entity definitions
//!
//! Hand-maintained to match `database::migrations`.

pub mod prelude;

pub mod company_name_index;
pub mod deferred_resolutions;
