//! Page sessions, extraction strategies, and the Download Resilience Layer.
//!
//! This crate provides:
//! - [`session`]: the [`PageSession`] / [`BinaryFetcher`] collaborator traits
//! - [`download`]: bounded, cancellable fetch-and-persist of single documents
//! - [`retry`]: exponential-backoff [`RetryPolicy`] driven by an error classifier
//! - [`http`]: reqwest + scraper implementations with form sign-in
//! - [`strategies`]: selector-fallback extraction chains

pub mod download;
pub mod http;
pub mod retry;
pub mod session;
pub mod strategies;

pub use download::{DocumentDownloader, DownloadOutcome, FailureContext, REASON_IN_FLIGHT, REASON_TIMEOUT};
pub use http::{HttpFetcher, HttpSession};
pub use retry::{Attempt, RetryPolicy};
pub use session::{AuthContext, BinaryFetcher, FetchedBinary, PageSession, RawMeeting};
pub use strategies::{ExtractionStrategy, StrategyChain};
