#![doc = "repo-launcher-core: core logic library for repo-launcher."]

//! Repository sync decisions, the crash-safe install marker, requirements
//! resolution and the pip install orchestrator with intercepted artifact
//! downloads. Nothing here prints; progress leaves the crate as
//! [`events::LauncherEvent`]s.
//!
//! # Usage
//! Build a [`config::LauncherConfig`], then call [`synchronise::synchronise`]
//! with a [`pip::PipPackageManager`], a [`download::HttpArtifactFetcher`] and a
//! [`repo_sync::GitCli`] (or mocks from [`contract`]).

pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod events;
pub mod marker;
pub mod orchestrator;
pub mod pip;
pub mod repo_sync;
pub mod requirements;
pub mod scanner;
pub mod synchronise;

pub use error::LauncherError;
pub use synchronise::{synchronise, LaunchOutcome, BOOTSTRAP_RESTART_EXIT_CODE};
