//! Shared types, error model, and configuration for JobRadar.
//!
//! This crate is the foundation depended on by all other JobRadar crates.
//! It provides:
//! - [`JobRadarError`]: the unified error type
//! - Domain types ([`Job`], [`Company`], [`PersistedJob`], [`Source`])
//! - Configuration ([`AppConfig`], runtime policies, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, HttpConfig, NotifyConfig, NotifyKind, PaginationLimits,
    PipelineConfig, Politeness, RelevanceConfig, RetryPolicy, SearchTrack, SourceOverrides,
    SourceSettings, SourcesConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, webhook_url,
};
pub use error::{JobRadarError, Result};
pub use types::{AtsType, Company, Job, JobKey, PersistedJob, Source, content_hash};
