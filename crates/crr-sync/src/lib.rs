//! # crr-sync
//!
//! The sync protocol surface over a [`Replica`]: the changes reader
//! (outbound) and the merge engine (inbound). Transport is the caller's
//! problem; this crate only reads and applies change records.
//!
//! [`Replica`]: crr_storage::Replica

pub mod merge;
pub mod reader;

pub use merge::MergeEngine;
pub use reader::read_changes;
