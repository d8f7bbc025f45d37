//! Turning uploaded media into transcripts with an external transcriber.

pub mod files;
pub mod profile;
pub mod runner;
pub mod summarizer;
pub mod worker;

pub use profile::Profile;
pub use summarizer::{ExcerptSummarizer, Summarizer};
pub use worker::{TranscriptionWorker, CANCELLED_MESSAGE, NO_OUTPUT_MESSAGE};
