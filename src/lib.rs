//! Queued transcription service: uploads become jobs, a single background
//! worker runs them through an external transcriber, and a daily sweep
//! enforces file retention.

pub mod api;
pub mod app;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod global;
pub mod jobs;
pub mod service;
pub mod store;
pub mod transcription;
