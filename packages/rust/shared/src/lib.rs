//! Shared types, error model, and configuration for Tenderfold.
//!
//! This crate is the foundation depended on by all other Tenderfold crates.
//! It provides:
//! - [`TenderfoldError`] — the unified error type
//! - Domain types ([`ProjectRoot`], [`ContentDigest`], [`Capabilities`])
//! - Configuration ([`AppConfig`], [`LayoutConfig`], config loading)
//! - Filesystem helpers shared by the pipeline crates

pub mod config;
pub mod error;
pub mod fsutil;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, LayoutConfig, LayoutSection, RemoteSection, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{Result, TenderfoldError};
pub use fsutil::{has_cjk, is_image_file, move_entry, unique_path};
pub use types::{Capabilities, ContentDigest, ProjectRoot};
