//! Common test utilities and helpers for ghbackup tests
#![allow(dead_code)]

use async_trait::async_trait;
use ghbackup::{Error, GitOps, RepositoryDescriptor, Result};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A git invocation seen by [`RecordingGit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Clone { url: String, path: PathBuf },
    Pull { path: PathBuf },
    InitBare { path: PathBuf },
    FetchMirror { url: String, path: PathBuf },
}

/// Fake git that records every invocation instead of running git
///
/// Clones create the target directory like the real command would, so a
/// second run sees the repository as present. Repositories registered with
/// [`fail_for`](RecordingGit::fail_for) exit with a non-zero status.
#[derive(Clone, Default)]
pub struct RecordingGit {
    calls: Arc<Mutex<Vec<GitCall>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, repo_name: &str) {
        self.failing.lock().unwrap().insert(repo_name.to_string());
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: GitCall, operation: &'static str, path: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(call);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing.lock().unwrap().contains(&name) {
            return Err(Error::Sync {
                operation,
                path: path.to_path_buf(),
                detail: "exit status: 128".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GitOps for RecordingGit {
    async fn clone_repo(&self, url: &str, path: &Path) -> Result<()> {
        self.record(
            GitCall::Clone {
                url: url.to_string(),
                path: path.to_path_buf(),
            },
            "git clone",
            path,
        )?;
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    async fn pull(&self, path: &Path) -> Result<()> {
        self.record(GitCall::Pull { path: path.to_path_buf() }, "git pull", path)
    }

    async fn init_bare(&self, path: &Path) -> Result<()> {
        self.record(GitCall::InitBare { path: path.to_path_buf() }, "git init", path)
    }

    async fn fetch_mirror(&self, url: &str, path: &Path) -> Result<()> {
        self.record(
            GitCall::FetchMirror {
                url: url.to_string(),
                path: path.to_path_buf(),
            },
            "git fetch",
            path,
        )
    }
}

/// Descriptor for a repository hosted on github.com
pub fn repo(owner: &str, name: &str) -> RepositoryDescriptor {
    RepositoryDescriptor::new(name, owner, format!("https://github.com/{}/{}.git", owner, name))
        .expect("test repository names are valid")
}

/// JSON record as returned by `GET /user/repos`
pub fn repo_json(owner: &str, name: &str) -> Value {
    json!({
        "id": 1,
        "name": name,
        "full_name": format!("{}/{}", owner, name),
        "private": false,
        "clone_url": format!("https://github.com/{}/{}.git", owner, name),
        "owner": { "login": owner, "id": 2 }
    })
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
