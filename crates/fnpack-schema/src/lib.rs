//! Configuration schema and shared identifier types for fnpack.
//!
//! This crate defines the declarative input of a packaging run: the TOML
//! `PackageConfig` with its `LayerSpec` and `FunctionSpec` entries, path
//! rebasing relative to the configuration file, and the validation pass that
//! guarantees referential integrity before anything is planned or built.

pub mod config;
pub mod types;

pub use config::{
    check_tag_template, is_entry_point, load_config_file, parse_config_str, ConfigError,
    FunctionSpec, LayerSpec, PackageConfig, CONFIG_FILE, DEFAULT_IMAGE_NAMESPACE,
};
pub use types::{
    ArchiveFormat, OutputFormat, Platform, Runtime, TargetKind, TargetName, BASELINE_PLATFORM,
    DEFAULT_RUNTIME,
};
