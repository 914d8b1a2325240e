use async_trait::async_trait;
use url::Url;
use std::fmt;
use std::path::Path;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::error::{Error, Result};

/// Token and the login it authenticated as
#[derive(Clone)]
pub struct Credentials {
    login: String,
    token: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            token: token.into(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Replace every occurrence of the token in `text`
    pub fn redact(&self, text: &str) -> String {
        if self.token.is_empty() {
            return text.to_string();
        }
        text.replace(&self.token, "***")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Embed `login:token@` in the authority of a clone URL
///
/// The resulting URL carries the secret and must only ever be handed to git.
pub fn authenticated_url(clone_url: &str, credentials: &Credentials) -> Result<String> {
    let invalid = |detail: String| Error::sync("credential injection", clone_url, detail);

    let mut url = Url::parse(clone_url).map_err(|e| invalid(e.to_string()))?;
    url.set_username(&credentials.login)
        .map_err(|_| invalid("URL cannot carry credentials".to_string()))?;
    url.set_password(Some(&credentials.token))
        .map_err(|_| invalid("URL cannot carry credentials".to_string()))?;

    Ok(url.into())
}

/// The git operations the sync engine relies on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitOps: Send + Sync {
    /// `git clone --quiet <url> <path>`
    async fn clone_repo(&self, url: &str, path: &Path) -> Result<()>;

    /// `git pull --quiet` inside `path`
    async fn pull(&self, path: &Path) -> Result<()>;

    /// `git init --bare --quiet` inside `path`
    async fn init_bare(&self, path: &Path) -> Result<()>;

    /// `git fetch --quiet --force --prune --tags <url> refs/heads/*:refs/heads/*` inside `path`
    async fn fetch_mirror(&self, url: &str, path: &Path) -> Result<()>;
}

/// [`GitOps`] backed by the `git` executable on PATH
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    /// Use a specific git executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `git --version`, if git can be executed at all
    pub async fn version(&self) -> Option<String> {
        let output = AsyncCommand::new(&self.program)
            .arg("--version")
            .output()
            .await
            .ok()?;

        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(
        &self,
        operation: &'static str,
        args: &[&str],
        cwd: Option<&Path>,
        target: &Path,
    ) -> Result<()> {
        let mut command = AsyncCommand::new(&self.program);
        command.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        debug!("Running {} for {}", operation, target.display());

        let output = command
            .output()
            .await
            .map_err(|e| Error::sync(operation, target, format!("failed to execute git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = match stderr.trim() {
                "" => output.status.to_string(),
                message => format!("{}: {}", output.status, message),
            };
            return Err(Error::sync(operation, target, detail));
        }

        Ok(())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitOps for GitCli {
    async fn clone_repo(&self, url: &str, path: &Path) -> Result<()> {
        let path_arg = path.to_string_lossy();
        self.run("git clone", &["clone", "--quiet", url, &*path_arg], None, path)
            .await
    }

    async fn pull(&self, path: &Path) -> Result<()> {
        self.run("git pull", &["pull", "--quiet"], Some(path), path).await
    }

    async fn init_bare(&self, path: &Path) -> Result<()> {
        self.run("git init", &["init", "--bare", "--quiet"], Some(path), path)
            .await
    }

    async fn fetch_mirror(&self, url: &str, path: &Path) -> Result<()> {
        self.run(
            "git fetch",
            &[
                "fetch",
                "--quiet",
                "--force",
                "--prune",
                "--tags",
                url,
                "refs/heads/*:refs/heads/*",
            ],
            Some(path),
            path,
        )
        .await
    }
}
