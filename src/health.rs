//! System health checks for ghbackup
//!
//! Preflight checks behind `ghbackup doctor`: git is installed, the token
//! authenticates, and the backup root is usable.

use std::path::Path;

use crate::config::QuerySettings;
use crate::git::GitCli;
use crate::github::GitHubClient;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// GitHub authentication status
    pub github_auth: CheckResult,
    /// Backup directory status
    pub backup_dir: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::ok(message)
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::error(message)
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub async fn run(settings: &QuerySettings, git: &GitCli) -> Self {
        Self {
            git: Self::check_git(git).await,
            github_auth: Self::check_github_auth(settings).await,
            backup_dir: match &settings.directory {
                Some(directory) => Self::check_backup_dir(directory),
                None => CheckResult::warning_with_details(
                    "No backup location configured",
                    "Set --directory, GITHUB_BACKUP_DIRECTORY or \"directory\" in the config file",
                ),
            },
        }
    }

    /// Check if all required checks passed (warnings still pass)
    pub fn all_passed(&self) -> bool {
        self.all_checks().iter().all(|(_, result)| result.passed)
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, result)| result)
            .filter(|r| r.is_warning)
            .collect()
    }

    /// Named checks in display order
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 3] {
        [
            ("Git", &self.git),
            ("GitHub Authentication", &self.github_auth),
            ("Backup Directory", &self.backup_dir),
        ]
    }

    /// Check git installation
    async fn check_git(git: &GitCli) -> CheckResult {
        match git.version().await {
            Some(version) => CheckResult::ok_with_details("Git installed", version),
            None => CheckResult::error_with_details(
                "Git not found in PATH",
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// Check GitHub authentication
    async fn check_github_auth(settings: &QuerySettings) -> CheckResult {
        let client = match GitHubClient::new(&settings.api_url, &settings.token) {
            Ok(client) => client,
            Err(e) => return CheckResult::error(e.to_string()),
        };

        match client.authenticate().await {
            Ok(login) => CheckResult::ok_with_details(
                "GitHub authentication successful",
                format!("Logged in as {} ({})", login, settings.api_url),
            ),
            Err(e) => CheckResult::error_with_details(
                "GitHub authentication failed",
                e.to_string(),
            ),
        }
    }

    /// Check the backup root
    fn check_backup_dir(path: &Path) -> CheckResult {
        if path.is_dir() {
            match Self::check_writable(path) {
                Ok(()) => CheckResult::ok(format!("Backup directory: {}", path.display())),
                Err(e) => CheckResult::error_with_details(
                    "Backup directory is not writable",
                    format!("{}: {}", path.display(), e),
                ),
            }
        } else if path.exists() {
            CheckResult::error_with_details(
                "Backup location is not a directory",
                path.display().to_string(),
            )
        } else {
            CheckResult::warning_with_details(
                "Backup directory does not exist yet",
                format!("{} will be created on the first run", path.display()),
            )
        }
    }

    /// Create and remove a scratch file in `dir`
    fn check_writable(dir: &Path) -> std::io::Result<()> {
        let scratch = dir.join(format!(".ghbackup-write-check-{}", std::process::id()));
        std::fs::write(&scratch, b"")?;
        std::fs::remove_file(&scratch)
    }
}
