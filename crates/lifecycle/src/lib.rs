//! Snapshot lifecycle orchestration
//!
//! This crate drives the per-volume create → upload → prune → persist cycle
//! against the storage and backup capabilities, and aggregates per-volume
//! outcomes into a run summary.

pub mod coordinator;
pub mod manager;
pub mod report;

#[cfg(test)]
mod testing;

pub use coordinator::RunCoordinator;
pub use manager::{remote_id, Backup, Dedup, VolumeManager};
pub use report::{CreatedSnapshot, CycleState, Failure, RunSummary, VolumeReport};
