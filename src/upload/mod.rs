//! Chunked Upload Module
//!
//! Owns the upload side of a share's lifecycle:
//! - Upload sessions: capability-token-scoped, expiring upload attempts
//! - Per-chunk confirmation with idempotent retries
//! - Assembly of confirmed chunks into the final encrypted object
//!
//! Protocol flow:
//! 1. Client initiates an upload and receives presigned chunk URLs
//! 2. Client uploads chunk bytes and confirms each chunk
//! 3. Once every chunk is confirmed, client completes the upload with the
//!    encrypted content key; the server assembles and stores the object

pub mod assembly;
pub mod service;
pub mod types;

pub use assembly::AssemblyEngine;
pub use service::UploadService;
pub use types::*;
