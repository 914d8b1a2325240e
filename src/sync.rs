//! Sync Engine - reconciles local repositories with the remote listing
//!
//! For every repository the engine derives its local path, looks at whether
//! that path already exists, and picks an action from the requested
//! [`SyncMode`]:
//!
//! | exists | mode   | action                                   |
//! |--------|--------|------------------------------------------|
//! | no     | clone  | `git clone`                              |
//! | no     | mirror | `git init --bare` then one `git fetch`   |
//! | yes    | clone  | `git pull`                               |
//! | yes    | mirror | nothing (existing mirrors are not refreshed) |
//!
//! Git failures are reported per repository and never stop the run. Errors
//! from the [`RepoSource`] (authentication, listing, validation) do.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{OwnerFilter, SyncMode};
use crate::discovery::{RepoSource, RepositoryDescriptor};
use crate::error::{Error, Result};
use crate::git::{authenticated_url, Credentials, GitCli, GitOps};

/// What the engine does for one repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Fresh working clone
    Clone,
    /// Fast-forward an existing working clone
    Pull,
    /// Create a bare repository and fetch every branch and tag into it
    InitMirror,
    /// Existing mirror, left as is
    LeaveMirror,
}

impl SyncAction {
    /// Decision table for a mode and the presence of the local path
    pub fn decide(mode: SyncMode, exists: bool) -> Self {
        match (exists, mode) {
            (false, SyncMode::Clone) => SyncAction::Clone,
            (false, SyncMode::Mirror) => SyncAction::InitMirror,
            (true, SyncMode::Clone) => SyncAction::Pull,
            (true, SyncMode::Mirror) => SyncAction::LeaveMirror,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            SyncAction::Clone => "clone",
            SyncAction::Pull => "pull",
            SyncAction::InitMirror => "create mirror",
            SyncAction::LeaveMirror => "leave existing mirror",
        }
    }
}

/// Result of processing one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Repository was cloned
    Cloned { path: PathBuf },
    /// Existing clone was pulled
    Pulled { path: PathBuf },
    /// Bare mirror was created and fetched
    Mirrored { path: PathBuf },
    /// Mirror already existed, nothing was run
    MirrorUnchanged { path: PathBuf },
    /// Dry run: the action that would have been taken
    Planned { path: PathBuf, action: SyncAction },
    /// Owner did not match the filter
    Filtered,
    /// A git step failed; the run continued
    Failed { path: PathBuf, error: String },
}

/// Results from a complete run
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub total_repositories: usize,
    pub cloned: usize,
    pub pulled: usize,
    pub mirrored: usize,
    pub unchanged: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pages: usize,
    pub duration: Duration,
    /// `(owner/name, error)` for every failed repository
    pub failures: Vec<(String, String)>,
}

impl SyncSummary {
    fn record(&mut self, repo: &RepositoryDescriptor, outcome: &SyncOutcome) {
        self.total_repositories += 1;
        match outcome {
            SyncOutcome::Cloned { .. } => self.cloned += 1,
            SyncOutcome::Pulled { .. } => self.pulled += 1,
            SyncOutcome::Mirrored { .. } => self.mirrored += 1,
            SyncOutcome::MirrorUnchanged { .. } => self.unchanged += 1,
            SyncOutcome::Planned { .. } => self.planned += 1,
            SyncOutcome::Filtered => self.skipped += 1,
            SyncOutcome::Failed { error, .. } => {
                self.failed += 1;
                self.failures.push((repo.full_name(), error.clone()));
            }
        }
    }

    /// Repositories the engine actually acted on (excludes filtered ones)
    pub fn processed(&self) -> usize {
        self.total_repositories - self.skipped
    }
}

/// Local path for a repository: `<root>/<authenticated login>/<name>`
///
/// The authenticated login is used even for repositories owned by someone
/// else, so every backup of one account lands in a single directory.
pub fn local_repo_path(root: &Path, login: &str, name: &str) -> PathBuf {
    root.join(login).join(name)
}

/// The main sync engine that orchestrates repository synchronization
pub struct SyncEngine<G = GitCli> {
    git: G,
    root: PathBuf,
    mode: SyncMode,
    owners: OwnerFilter,
    credentials: Credentials,
    dry_run: bool,
}

impl<G: GitOps> SyncEngine<G> {
    pub fn new(
        git: G,
        root: impl Into<PathBuf>,
        mode: SyncMode,
        owners: OwnerFilter,
        credentials: Credentials,
    ) -> Self {
        Self {
            git,
            root: root.into(),
            mode,
            owners,
            credentials,
            dry_run: false,
        }
    }

    /// Report planned actions without touching the filesystem or running git
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Drain `source` page by page, synchronizing every repository
    ///
    /// Stops at the first error from the source. Repositories handled before
    /// that point stay on disk.
    pub async fn run<S: RepoSource + ?Sized>(&self, source: &mut S) -> Result<SyncSummary> {
        let start_time = Instant::now();
        let mut summary = SyncSummary::default();

        info!(
            "Starting {} of repositories into {}",
            self.mode,
            self.root.display()
        );

        while source.has_more() {
            let page = source.next_page().await?;
            summary.pages += 1;
            debug!("Processing page {} ({} repositories)", summary.pages, page.len());

            for repo in &page {
                let outcome = self.sync_repository(repo).await;
                summary.record(repo, &outcome);
            }
        }

        summary.duration = start_time.elapsed();

        info!(
            "Sync completed in {:.2}s: {} processed, {} failed, {} skipped",
            summary.duration.as_secs_f64(),
            summary.processed(),
            summary.failed,
            summary.skipped
        );

        Ok(summary)
    }

    /// Synchronize one repository; failures are reported, never returned
    pub async fn sync_repository(&self, repo: &RepositoryDescriptor) -> SyncOutcome {
        let full_name = repo.full_name();

        if !self.owners.matches(repo.owner_login()) {
            debug!("Skipping {}: owner not in filter", full_name);
            return SyncOutcome::Filtered;
        }

        match self.mode {
            SyncMode::Clone => println!("Cloning {}", full_name),
            SyncMode::Mirror => println!("Backing up {}", full_name),
        }

        let path = local_repo_path(&self.root, self.credentials.login(), repo.name());
        let exists = path.exists();
        if exists {
            println!("Repository already exists: {}", path.display());
        }

        let action = SyncAction::decide(self.mode, exists);
        let outcome = if self.dry_run {
            println!("Would {}: {}", action.describe(), path.display());
            SyncOutcome::Planned { path, action }
        } else {
            match self.apply(action, repo, &path).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let error = self.credentials.redact(&e.to_string());
                    warn!("Failed to sync {}: {}", full_name, error);
                    eprintln!("Failed {}: {}", full_name, error);
                    SyncOutcome::Failed { path, error }
                }
            }
        };

        println!("Finished Processing {}\n", full_name);
        outcome
    }

    async fn apply(
        &self,
        action: SyncAction,
        repo: &RepositoryDescriptor,
        path: &Path,
    ) -> Result<SyncOutcome> {
        match action {
            SyncAction::Clone => {
                if let Some(parent) = path.parent() {
                    create_dir(parent).await?;
                }
                let url = authenticated_url(repo.clone_url(), &self.credentials)?;
                self.git.clone_repo(&url, path).await?;

                info!("Cloned {} into {}", repo.full_name(), path.display());
                Ok(SyncOutcome::Cloned {
                    path: path.to_path_buf(),
                })
            }
            SyncAction::Pull => {
                self.git.pull(path).await?;

                debug!("Pulled {}", path.display());
                Ok(SyncOutcome::Pulled {
                    path: path.to_path_buf(),
                })
            }
            SyncAction::InitMirror => {
                let url = authenticated_url(repo.clone_url(), &self.credentials)?;
                create_dir(path).await?;
                self.git.init_bare(path).await?;
                self.git.fetch_mirror(&url, path).await?;

                info!("Mirrored {} into {}", repo.full_name(), path.display());
                Ok(SyncOutcome::Mirrored {
                    path: path.to_path_buf(),
                })
            }
            SyncAction::LeaveMirror => {
                debug!("Existing mirror {} left unchanged", path.display());
                Ok(SyncOutcome::MirrorUnchanged {
                    path: path.to_path_buf(),
                })
            }
        }
    }
}

async fn create_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::sync("create directory", path, e.to_string()))
}
