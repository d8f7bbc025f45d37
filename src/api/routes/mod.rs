//! API route modules.

pub mod transcriptions;
