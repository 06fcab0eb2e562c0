//! Forward-sync: keep webmail forwarding rules in line with a member directory.

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod membership;
pub mod sync;
pub mod webmail;
