//! shiplog library crate
//!
//! Discovers the pull requests a user merged over a date window and folds
//! their summaries into a per-project feature log. The binary in `main.rs`
//! is a thin CLI over [`pipeline`].

pub mod cache;
pub mod clustering;
pub mod config;
pub mod discovery;
pub mod error;
pub mod github;
pub mod keyring;
pub mod pipeline;
pub mod report;
pub mod summarize;
pub mod util;
