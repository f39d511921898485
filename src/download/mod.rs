//! Download Authorization Module
//!
//! The gate between an approved access request and the encrypted bytes.
//! Enforces approval, expiry, the gate booleans, and the distinct-requester
//! download ceiling before any content or key leaves the server.

pub mod service;

pub use service::{DownloadPayload, DownloadService};
