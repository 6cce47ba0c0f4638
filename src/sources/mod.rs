//! External lookup sources
//!
//! The EQC company search service is reached through the `EqcTransport` seam.
//! The transport only moves bytes and classifies network failures; status code
//! interpretation, retries and budget accounting live in
//! `services::eqc_provider`.

pub mod eqc;

pub use eqc::{EqcSearchResponse, EqcTransport, ReqwestTransport, TransportError, TransportResponse};
