//! Shared types, error model, and configuration for Ratsarchiv.
//!
//! This crate is the foundation depended on by all other Ratsarchiv crates.
//! It provides:
//! - [`HarvestError`]: the unified error type and its [`ErrorClass`]
//! - Domain types ([`MonthUnit`], [`MeetingRecord`], [`AgendaItem`], [`DocumentRef`])
//! - Configuration ([`AppConfig`], [`HarvestConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlSettings, Credentials, HarvestConfig, OutputConfig, SourceConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_credentials,
    validate_source,
};
pub use error::{ErrorClass, HarvestError, Result};
pub use types::{
    AgendaItem, DocumentRef, DocumentStatus, MeetingRecord, MonthName, MonthUnit, RunId,
    WalkDirection,
};
