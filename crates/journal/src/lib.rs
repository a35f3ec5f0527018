//! Persisted volume configuration and snapshot history
//!
//! This crate provides:
//! - `VolumeConfig`: source path, snapshot storage location, retention
//!   options and the ordered snapshot history of one volume
//! - `ConfigStore`: every volume of a host, loaded once and saved
//!   atomically (TOML document, temp file + rename)

pub mod store;
pub mod volume;

// Re-exports
pub use store::{atomic_write, ConfigStore};
pub use volume::VolumeConfig;
