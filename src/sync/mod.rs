//! Reconciliation of member addresses against forwarding rules.

pub mod diff;
pub mod report;
pub mod runner;
pub mod state;

pub use diff::{SyncDiff, diff};
pub use runner::{ItemAction, ItemFailure, SyncOptions, SyncReport, Synchronizer};
pub use state::{SyncRun, SyncState};
