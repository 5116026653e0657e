//! Shared types, error model, and configuration for mfdocs.
//!
//! This crate is the foundation depended on by all other mfdocs crates.
//! It provides:
//! - [`MfDocsError`] — the unified error type
//! - Domain types ([`DocumentType`], [`DocumentDescriptor`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserConfig, DefaultsConfig, HttpConfig, PortalConfig, RunConfig, TimingConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{MfDocsError, Result};
pub use types::{DocumentDescriptor, DocumentType};
