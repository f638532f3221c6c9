//! Server middleware
//!
//! Admission control and connection logging around each session.

pub mod admission;
pub mod logging;

pub use admission::{AdmissionGuard, ConnectionLimiter, Refusal};
