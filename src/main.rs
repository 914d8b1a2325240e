use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ghbackup::config::{
    resolve_query_settings, resolve_settings, ConfigOverrides, Environment, FileConfig, StdinPrompt,
};
use ghbackup::health::CheckResult;
use ghbackup::{
    Credentials, GitCli, GitHubClient, HealthCheck, QuerySettings, Settings, SyncEngine, SyncSummary,
};

#[derive(Parser)]
#[command(name = "ghbackup")]
#[command(about = "Backup or Clone repositories from GitHub to local directory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file (default: ./config.json, then the XDG config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to backup location
    #[arg(short, long, global = true)]
    directory: Option<String>,

    /// Only repositories whose owner matches this filter
    #[arg(short, long, global = true)]
    owners: Option<String>,

    /// GitHub token
    #[arg(short, long, global = true)]
    token: Option<String>,

    /// Type of backup
    #[arg(short = 'y', long = "type", global = true, value_parser = ["backup", "clone", "mirror"])]
    mode: Option<String>,

    /// GitHub API base URL (for GitHub Enterprise)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up or clone every repository (default)
    Run {
        /// Show what would be done without touching the disk
        #[arg(long)]
        dry_run: bool,
    },

    /// List repositories that would be processed
    List {
        /// Show clone URLs
        #[arg(long)]
        details: bool,
    },

    /// System health check and diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    info!("Starting ghbackup v{}", env!("CARGO_PKG_VERSION"));

    let sources = load_sources(&cli)?;

    match cli.command.unwrap_or(Commands::Run { dry_run: false }) {
        Commands::Run { dry_run } => cmd_run(&sources.settings()?, dry_run).await,
        Commands::List { details } => cmd_list(&sources.query_settings()?, details).await,
        Commands::Doctor => cmd_doctor(&sources.query_settings()?).await,
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Configuration inputs gathered before any command runs
struct ConfigSources {
    overrides: ConfigOverrides,
    env: Environment,
    file: Option<FileConfig>,
}

impl ConfigSources {
    /// Everything `run` needs, prompting for whatever is missing
    fn settings(&self) -> Result<Settings> {
        resolve_settings(&self.overrides, &self.env, self.file.as_ref(), &mut StdinPrompt)
            .context("Failed to resolve configuration")
    }

    /// Token, API URL and optional values for `list` and `doctor`
    fn query_settings(&self) -> Result<QuerySettings> {
        resolve_query_settings(&self.overrides, &self.env, self.file.as_ref(), &mut StdinPrompt)
            .context("Failed to resolve configuration")
    }
}

/// Read arguments, environment and config file
fn load_sources(cli: &Cli) -> Result<ConfigSources> {
    let config_path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            FileConfig::discover(&cwd)
        }
    };

    let file = config_path
        .as_deref()
        .map(FileConfig::load)
        .transpose()
        .context("Failed to load configuration")?;
    if let Some(path) = &config_path {
        info!("Using configuration file: {}", path.display());
    }

    Ok(ConfigSources {
        overrides: ConfigOverrides {
            token: cli.token.clone(),
            directory: cli.directory.clone(),
            owners: cli.owners.clone(),
            mode: cli.mode.clone(),
            api_url: cli.api_url.clone(),
        },
        env: Environment::from_process(),
        file,
    })
}

/// Authenticate and return the client together with the run's credentials
async fn connect(api_url: &str, token: &str) -> Result<(GitHubClient, Credentials)> {
    let client = GitHubClient::new(api_url, token)?;
    let login = client
        .authenticate()
        .await
        .context("Failed to get current user information. Check your token.")?;

    Ok((client, Credentials::new(login, token)))
}

/// Back up or clone every repository
async fn cmd_run(settings: &Settings, dry_run: bool) -> Result<()> {
    println!("\nghbackup - GitHub Repository Backup");
    println!("====================================\n");

    if !dry_run && !settings.directory.exists() {
        tokio::fs::create_dir_all(&settings.directory)
            .await
            .with_context(|| format!("Failed to create {}", settings.directory.display()))?;
        eprintln!("Created directory {}", settings.directory.display());
    }

    let (client, credentials) = connect(&settings.api_url, &settings.token).await?;
    println!("Logged in as {}\n", credentials.login());

    let engine = SyncEngine::new(
        GitCli::new(),
        &settings.directory,
        settings.mode,
        settings.owners.clone(),
        credentials,
    )
    .with_dry_run(dry_run);

    let mut pages = client.repositories();
    let summary = engine
        .run(&mut pages)
        .await
        .context("Repository synchronization aborted")?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    println!("Summary:");
    println!("   Repositories processed: {}", summary.processed());
    if summary.cloned > 0 {
        println!("   Cloned: {}", summary.cloned);
    }
    if summary.pulled > 0 {
        println!("   Pulled: {}", summary.pulled);
    }
    if summary.mirrored > 0 {
        println!("   Mirrored: {}", summary.mirrored);
    }
    if summary.unchanged > 0 {
        println!(
            "   Existing mirrors left unchanged: {} (mirrors are not refreshed; delete one to fetch it again)",
            summary.unchanged
        );
    }
    if summary.planned > 0 {
        println!("   Planned (dry run): {}", summary.planned);
    }
    println!("   Skipped by owner filter: {}", summary.skipped);
    println!("   Failed: {}", summary.failed);
    println!("   Duration: {:.2}s", summary.duration.as_secs_f64());

    if !summary.failures.is_empty() {
        println!("\nFailed repositories:");
        for (name, error) in &summary.failures {
            println!("   {}: {}", name, error);
        }
    }
}

/// List repositories that would be processed
async fn cmd_list(settings: &QuerySettings, details: bool) -> Result<()> {
    let (client, _credentials) = connect(&settings.api_url, &settings.token).await?;

    let mut repos = Box::pin(client.repositories().into_stream());
    let mut count = 0usize;

    while let Some(repo) = repos
        .try_next()
        .await
        .context("Failed to list repositories")?
    {
        if !settings.owners.matches(repo.owner_login()) {
            continue;
        }
        count += 1;

        if details {
            println!("{}", repo.full_name());
            println!("   {}", repo.clone_url());
        } else {
            println!("  {}", repo.full_name());
        }
    }

    println!("\nRepositories: {}", count);
    Ok(())
}

/// System health check and diagnostics
async fn cmd_doctor(settings: &QuerySettings) -> Result<()> {
    let health = HealthCheck::run(settings, &GitCli::new()).await;
    print_health_report(&health);

    if !health.all_passed() {
        anyhow::bail!("Some checks failed");
    }
    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let label = if !result.passed {
            "FAIL"
        } else if result.is_warning {
            "WARN"
        } else {
            " OK "
        };
        println!("  [{}] {}", label, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("       {}", line);
            }
        }
    }

    println!("ghbackup System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    let warnings = health.warnings().len();
    if health.all_passed() && warnings > 0 {
        println!("All checks passed ({} warning(s))", warnings);
    } else if health.all_passed() {
        println!("All checks passed");
    } else {
        println!("Some checks failed");
    }
}
