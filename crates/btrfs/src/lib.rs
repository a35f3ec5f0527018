//! External capabilities backed by command line tools
//!
//! This crate provides:
//! - `BtrfsCli`: create/delete/send/show through `btrfs-progs`
//! - `CommandUploader`: offsite upload through a configured command (B2 CLI
//!   by default)
//!
//! Every external call is bounded by a timeout; expiry is an ordinary
//! operation failure.

pub mod btrfs;
pub mod process;
pub mod upload;

pub use btrfs::BtrfsCli;
pub use upload::CommandUploader;
