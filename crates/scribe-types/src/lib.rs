//! Domain records for the scribe writer marketplace.
//!
//! Everything in this crate is plain data plus the rules that govern it:
//! the onboarding workflow, the earning ledger and its derived amounts,
//! messaging read-state, and the DTOs exchanged over HTTP. No I/O happens here.

pub mod api;
pub mod application;
pub mod earning;
pub mod error;
pub mod message;
pub mod stats;
pub mod user;

pub use error::{DomainError, DomainResult};
