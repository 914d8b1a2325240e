//! ghbackup - GitHub Repository Backup
//!
//! Mirrors every repository visible to a GitHub token onto local disk, either
//! as working clones kept current with `git pull`, or as bare mirrors.
//!
//! ## Modules
//!
//! - [`config`]: Settings resolution from arguments, environment, file and prompt
//! - [`github`]: Authentication and paginated repository listing
//! - [`discovery`]: Repository descriptors, name validation and the [`RepoSource`] seam
//! - [`git`]: The [`GitOps`] capability and its `git` executable implementation
//! - [`sync`]: The per-repository decision table and the run loop
//! - [`health`]: Preflight diagnostics

pub mod config;
pub mod discovery;
pub mod error;
pub mod git;
pub mod github;
pub mod health;
pub mod sync;

pub use config::{OwnerFilter, QuerySettings, Settings, SyncMode};
pub use discovery::{check_name, RepoSource, RepositoryDescriptor};
pub use error::{Error, Result};
pub use git::{Credentials, GitCli, GitOps};
pub use github::GitHubClient;
pub use health::HealthCheck;
pub use sync::{SyncAction, SyncEngine, SyncOutcome, SyncSummary};
