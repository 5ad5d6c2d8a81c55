//! Traversal engine for Ratsarchiv.
//!
//! This crate ties the page session, the completeness ledger, the extraction
//! cache and the download layer into one resumable walk (e.g., [`harvest`]).

pub mod controller;
pub mod extraction;
mod navigation;
pub mod pipeline;
pub mod processor;
pub mod resume;

#[cfg(test)]
mod testing;

pub use controller::{CrawlSummary, StopReason, TraversalController, UnitOutcome};
pub use pipeline::{ProgressReporter, SilentProgress, harvest, starting_unit};
pub use processor::{DocumentTally, UnitProcessor};
pub use resume::{next_candidate, resume_point};
