use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default GitHub REST API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

pub const ENV_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_DIRECTORY: &str = "GITHUB_BACKUP_DIRECTORY";
pub const ENV_OWNERS: &str = "GITHUB_BACKUP_OWNERS";
pub const ENV_TYPE: &str = "GITHUB_BACKUP_TYPE";
pub const ENV_API_URL: &str = "GITHUB_API_URL";

/// How repositories are stored locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Working clone, fast-forwarded with `git pull` on later runs
    Clone,
    /// Bare repository holding every branch and tag
    Mirror,
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "clone" => Ok(SyncMode::Clone),
            "backup" | "mirror" => Ok(SyncMode::Mirror),
            other => Err(Error::config(format!(
                "Invalid type: {} (expected 'backup' or 'clone')",
                other
            ))),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Clone => write!(f, "clone"),
            SyncMode::Mirror => write!(f, "backup"),
        }
    }
}

/// Owner filter as typed by the user
///
/// Matching is substring containment in either direction against the raw
/// value: `"alice,bob"` selects `bob`, and `"alice"` selects `alice-corp`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerFilter(String);

impl OwnerFilter {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a repository owned by `owner` should be processed
    pub fn matches(&self, owner: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        self.0.contains(owner) || owner.contains(self.0.as_str())
    }
}

/// `owners` may be written as a single string or a list in the config file
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OwnersValue {
    One(String),
    Many(Vec<String>),
}

impl OwnersValue {
    fn joined(&self) -> String {
        match self {
            OwnersValue::One(owners) => owners.clone(),
            OwnersValue::Many(owners) => owners.join(","),
        }
    }
}

/// On-disk configuration file (`config.json` or `config.yml`)
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FileConfig {
    /// GitHub personal access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Backup root directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    /// Owner filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owners: Option<OwnersValue>,

    /// "backup" or "clone"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// API base URL, for GitHub Enterprise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl FileConfig {
    /// Load configuration from a specific file
    ///
    /// YAML is used for `.yml`/`.yaml` files, JSON for everything else.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yml") | Some("yaml")
        );

        if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        }
    }

    /// Locate the config file to use when none was given on the command line
    ///
    /// Looks for `./config.json`, then `ghbackup/config.json` and
    /// `ghbackup/config.yml` under the XDG config directory.
    pub fn discover(working_dir: &Path) -> Option<PathBuf> {
        let local = working_dir.join("config.json");
        if local.is_file() {
            return Some(local);
        }

        let app_dir = config_dir()?.join("ghbackup");
        ["config.json", "config.yml"]
            .iter()
            .map(|name| app_dir.join(name))
            .find(|path| path.is_file())
    }
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub token: Option<String>,
    pub directory: Option<String>,
    pub owners: Option<String>,
    pub mode: Option<String>,
    pub api_url: Option<String>,
}

/// Snapshot of environment variables handed to configuration resolution
#[derive(Debug, Clone, Default)]
pub struct Environment(HashMap<String, String>);

impl Environment {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Source of answers for settings that are still missing
pub trait Prompt {
    fn ask(&mut self, question: &str) -> Result<String>;
}

/// Interactive prompt on the terminal
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        print!("{}: ", question);
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim().to_string())
    }
}

/// Fully resolved settings for one run
#[derive(Clone)]
pub struct Settings {
    pub token: String,
    pub directory: PathBuf,
    pub owners: OwnerFilter,
    pub mode: SyncMode,
    pub api_url: String,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("token", &"<redacted>")
            .field("directory", &self.directory)
            .field("owners", &self.owners)
            .field("mode", &self.mode)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Settings for commands that only query GitHub (`list`, `doctor`)
#[derive(Clone)]
pub struct QuerySettings {
    pub token: String,
    pub api_url: String,
    pub owners: OwnerFilter,
    /// Backup root, if one is configured
    pub directory: Option<PathBuf>,
}

impl fmt::Debug for QuerySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySettings")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("owners", &self.owners)
            .field("directory", &self.directory)
            .finish()
    }
}

/// Non-interactive sources in precedence order: argument, environment, file
struct Sources<'a> {
    overrides: &'a ConfigOverrides,
    env: &'a Environment,
    file: Option<&'a FileConfig>,
}

impl Sources<'_> {
    fn token(&self) -> Option<String> {
        first_present([
            self.overrides.token.as_deref(),
            self.env.get(ENV_TOKEN),
            self.file.and_then(|f| f.token.as_deref()),
        ])
    }

    fn directory(&self) -> Option<String> {
        first_present([
            self.overrides.directory.as_deref(),
            self.env.get(ENV_DIRECTORY),
            self.file.and_then(|f| f.directory.as_deref()),
        ])
    }

    fn owners(&self) -> Option<String> {
        let file_owners = self.file.and_then(|f| f.owners.as_ref()).map(OwnersValue::joined);
        first_present([
            self.overrides.owners.as_deref(),
            self.env.get(ENV_OWNERS),
            file_owners.as_deref(),
        ])
    }

    fn mode(&self) -> Option<String> {
        first_present([
            self.overrides.mode.as_deref(),
            self.env.get(ENV_TYPE),
            self.file.and_then(|f| f.mode.as_deref()),
        ])
    }

    fn api_url(&self) -> String {
        first_present([
            self.overrides.api_url.as_deref(),
            self.env.get(ENV_API_URL),
            self.file.and_then(|f| f.api_url.as_deref()),
        ])
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
        .trim_end_matches('/')
        .to_string()
    }

    fn token_or_prompt(&self, prompt: &mut dyn Prompt) -> Result<String> {
        let token = match self.token() {
            Some(token) => token,
            None => prompt.ask("GitHub token")?,
        };
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::config("a GitHub token is required"));
        }
        Ok(token.to_string())
    }
}

/// Resolve run settings by precedence: argument, environment, file, prompt
///
/// Empty values are treated as absent. This is the only place configuration
/// sources are consulted; nothing downstream reads the process environment.
pub fn resolve_settings(
    overrides: &ConfigOverrides,
    env: &Environment,
    file: Option<&FileConfig>,
    prompt: &mut dyn Prompt,
) -> Result<Settings> {
    let sources = Sources { overrides, env, file };

    let token = sources.token_or_prompt(prompt)?;

    let directory = match sources.directory() {
        Some(directory) => directory,
        None => prompt.ask("Backup location")?,
    };
    if directory.trim().is_empty() {
        return Err(Error::config("a backup location is required"));
    }
    let directory = expand_directory(directory.trim(), env)?;

    // An empty answer means "every owner"
    let owners = match sources.owners() {
        Some(owners) => owners,
        None => prompt.ask("GitHub owners (empty for all)")?,
    };

    let mode = match sources.mode() {
        Some(mode) => mode,
        None => prompt.ask("Type of backup (backup/clone)")?,
    };
    let mode: SyncMode = mode.parse()?;

    Ok(Settings {
        token,
        directory,
        owners: OwnerFilter::new(owners),
        mode,
        api_url: sources.api_url(),
    })
}

/// Resolve the settings `list` and `doctor` need
///
/// Same precedence as [`resolve_settings`], but only the token is ever
/// prompted for. Unset owners select every owner and the backup location
/// stays optional.
pub fn resolve_query_settings(
    overrides: &ConfigOverrides,
    env: &Environment,
    file: Option<&FileConfig>,
    prompt: &mut dyn Prompt,
) -> Result<QuerySettings> {
    let sources = Sources { overrides, env, file };

    let token = sources.token_or_prompt(prompt)?;
    let directory = sources
        .directory()
        .map(|directory| expand_directory(&directory, env))
        .transpose()?;

    Ok(QuerySettings {
        token,
        api_url: sources.api_url(),
        owners: OwnerFilter::new(sources.owners().unwrap_or_default()),
        directory,
    })
}

fn first_present<const N: usize>(candidates: [Option<&str>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Expand `~` and `$VAR` against the given environment
fn expand_directory(raw: &str, env: &Environment) -> Result<PathBuf> {
    let expanded = shellexpand::full_with_context(
        raw,
        || env.get("HOME"),
        |var: &str| -> std::result::Result<Option<String>, Infallible> {
            Ok(env.get(var).map(str::to_string))
        },
    )
    .map_err(|e| Error::config(format!("Failed to expand directory {}: {}", raw, e)))?;

    Ok(PathBuf::from(expanded.as_ref()))
}
