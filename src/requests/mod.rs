//! Access Request Module
//!
//! A recipient who holds a share id asks for access; the uploader approves or
//! rejects. Requests are capability tokens themselves: an approved request id
//! is what authorizes the download and key release.

pub mod service;
pub mod types;

pub use service::{AccessRequestService, CreateOutcome};
pub use types::*;
