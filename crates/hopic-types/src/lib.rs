//! Shared data model for the Hopic change-integration engine.
//!
//! This crate holds the plain, serde-able types that flow between Hopic's
//! components — the parsed pipeline configuration, the normalized step
//! shapes the config loader produces, credential descriptors, and the
//! per-commit state record that subcommands hand off to each other through
//! Git configuration. Nothing in this crate executes anything; it is pure
//! data plus the small amount of validation that is part of a type's shape
//! (e.g. rejecting a step that is neither a shell command nor metadata-only).
//!
//! # Modules
//!
//! - [`step`] — normalized build step shapes (`Step`, `ArtifactSpec`, `RunOnChange`, `Foreach`)
//! - [`credential`] — credential descriptors consumed by `with-credentials`
//! - [`config`] — the parsed, validated `PipelineConfig` and its nested records
//! - [`volume`] — bind-mount / `ci-locks` descriptors
//! - [`percommit`] — `PerCommitMeta`, the cross-subcommand state record

pub mod config;
pub mod credential;
pub mod percommit;
pub mod step;
pub mod volume;

pub use config::{PipelineConfig, VersionPolicy};
pub use credential::Credential;
pub use percommit::PerCommitMeta;
pub use step::{ArtifactSpec, Foreach, RunOnChange, Step};
pub use volume::{CiLock, VolumeSpec};
