//! actionvet core library.
//!
//! This crate exposes programmatic APIs for linting `uses:` references in
//! GitHub Actions workflows against a supply-chain policy.
//!
//! High-level modules:
//! - `cli`: CLI argument parsing (binary uses this).
//! - `action`: `uses:` value parsing into action references.
//! - `policy`: Policy flags, allowlists, and the builder with defaults.
//! - `config`: Per-project config discovery and the content-keyed policy cache.
//! - `workflow`: Workflow discovery and structure parsing with positions.
//! - `github`: Remote collaborators (tag resolution, repo metadata) and caches.
//! - `git`: Local repository identity from the `origin` remote.
//! - `linter`: The concurrent rule-chain evaluation pipeline.
//! - `error`: Violation taxonomy and failure types.
//! - `output`: Human/JSON printers for violations.

pub mod action;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod linter;
pub mod output;
pub mod policy;
pub mod workflow;
