//! Repository discovery abstraction layer
//!
//! Repositories reach the sync engine as [`RepositoryDescriptor`]s produced one
//! page at a time by a [`RepoSource`]. The GitHub implementation lives in
//! [`crate::github`]; tests drive the engine with in-memory pages.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::{Error, Result};

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\w[-.\w]*$").expect("name pattern is valid"))
}

/// Validate a repository or account name before it is used as a path component
///
/// Accepts a word character followed by word characters, `.` or `-`. Anything
/// else (path separators, whitespace, a leading `.`) is rejected.
pub fn check_name(name: &str) -> Result<&str> {
    if name_pattern().is_match(name) {
        Ok(name)
    } else {
        Err(Error::Validation {
            name: name.to_string(),
        })
    }
}

/// Repository record as returned by `GET /user/repos`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRepository {
    pub name: String,
    pub clone_url: String,
    pub owner: ApiOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiOwner {
    pub login: String,
}

/// A repository to synchronize, with validated name and owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    name: String,
    owner_login: String,
    clone_url: String,
}

impl RepositoryDescriptor {
    /// Build a descriptor, rejecting names that are unsafe on disk
    pub fn new(
        name: impl Into<String>,
        owner_login: impl Into<String>,
        clone_url: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let owner_login = owner_login.into();
        check_name(&name)?;
        check_name(&owner_login)?;

        Ok(Self {
            name,
            owner_login,
            clone_url: clone_url.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_login(&self) -> &str {
        &self.owner_login
    }

    /// Clone URL without credentials
    pub fn clone_url(&self) -> &str {
        &self.clone_url
    }

    /// Display name (owner/name format)
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner_login, self.name)
    }
}

impl TryFrom<ApiRepository> for RepositoryDescriptor {
    type Error = Error;

    fn try_from(repo: ApiRepository) -> Result<Self> {
        Self::new(repo.name, repo.owner.login, repo.clone_url)
    }
}

/// Pull-based, page-at-a-time source of repositories
///
/// A source is consumed once per run. Callers check [`has_more`] before each
/// [`next_page`]; an error from `next_page` ends the run.
///
/// [`has_more`]: RepoSource::has_more
/// [`next_page`]: RepoSource::next_page
#[async_trait]
pub trait RepoSource: Send {
    /// Whether another page can be requested
    fn has_more(&self) -> bool;

    /// Fetch the next page of repositories
    async fn next_page(&mut self) -> Result<Vec<RepositoryDescriptor>>;
}

/// In-memory source serving pre-built pages
pub struct StaticPages {
    pages: std::collections::VecDeque<Vec<RepositoryDescriptor>>,
}

impl StaticPages {
    pub fn new(pages: Vec<Vec<RepositoryDescriptor>>) -> Self {
        Self {
            pages: pages.into(),
        }
    }
}

#[async_trait]
impl RepoSource for StaticPages {
    fn has_more(&self) -> bool {
        !self.pages.is_empty()
    }

    async fn next_page(&mut self) -> Result<Vec<RepositoryDescriptor>> {
        Ok(self.pages.pop_front().unwrap_or_default())
    }
}
