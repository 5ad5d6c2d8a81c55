//! On-disk state for Ratsarchiv.
//!
//! Everything a later run needs to resume lives in the output tree:
//! - [`layout`]: directory and file naming
//! - [`ledger`]: Completeness Ledger marker files
//! - [`cache`]: per-month Extraction Cache
//! - [`failures`]: append-only failure ledger
//! - [`info`]: per-meeting and per-agenda-item JSON metadata
//!
//! There is no database and no lock file; marker existence is the only
//! cross-restart coordination.

pub mod cache;
pub mod failures;
pub mod info;
pub mod layout;
pub mod ledger;

pub use failures::{FailureLedger, FailureRecord, NOT_APPLICABLE};
pub use info::{AgendaInfo, DocumentEntry, MeetingInfo};
pub use layout::{OutputLayout, ensure_dir, sanitize_component, unique_destination};
pub use ledger::{CompletenessLedger, UnitLevel};
