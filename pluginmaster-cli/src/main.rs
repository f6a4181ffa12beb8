//! pluginmaster - plugin listing aggregator for the CN client
//!
//! Builds `pluginmaster.json` and `pluginmaster_gh.json` from the configured
//! sources, pinned to the state matching the CN platform version.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pluginmaster_core::config::{Config, GitHubConfig, DEFAULT_CONFIG_FILE};
use pluginmaster_core::delay::to_pretty_json;
use pluginmaster_core::fetch::{GitHubFetcher, GitHubFetcherConfig, PagedFetch};
use pluginmaster_core::history::{format_cutoff, HistoryResolver};
use pluginmaster_core::pipeline::Pipeline;
use pluginmaster_core::schedule::plan_run;
use pluginmaster_core::url::GitHubUrl;
use pluginmaster_core::Manifest;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "pluginmaster",
    about = "Aggregate plugin listings pinned to the CN platform version",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Configuration file
    #[clap(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON lines
    #[clap(long, global = true)]
    log_json: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Fetch every source and write both listings
    Run {
        /// Clock value to plan against (RFC 3339, defaults to now)
        #[clap(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Show the version table and the cutoff a run would use
    Plan {
        /// Clock value to plan against (RFC 3339, defaults to now)
        #[clap(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Classify GitHub URLs
    Classify {
        #[clap(required = true)]
        urls: Vec<String>,
    },

    /// Print the last commit on a branch at or before an instant
    ResolveCommit {
        owner: String,
        repo: String,
        branch: String,

        /// Cutoff (RFC 3339)
        #[clap(long)]
        before: DateTime<Utc>,
    },

    /// Print the first listed release published at or before an instant
    ResolveRelease {
        owner: String,
        repo: String,

        /// Cutoff (RFC 3339)
        #[clap(long)]
        before: DateTime<Utc>,
    },
}

/// Initialize tracing with CLI flags
///
/// Logs always go to stderr; stdout carries command output only.
fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::new(log_level.to_filter_directive());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Command::Run { now } => run_command(&cli.config, now.unwrap_or_else(Utc::now)).await,
        Command::Plan { now } => plan_command(&cli.config, now.unwrap_or_else(Utc::now)),
        Command::Classify { urls } => {
            classify_command(&urls);
            Ok(())
        }
        Command::ResolveCommit {
            owner,
            repo,
            branch,
            before,
        } => {
            let resolver = resolver(&cli.config)?;
            let sha = resolver
                .resolve_commit_before(&owner, &repo, &branch, &before)
                .await?;
            println!("{sha}");
            Ok(())
        }
        Command::ResolveRelease {
            owner,
            repo,
            before,
        } => {
            let resolver = resolver(&cli.config)?;
            let tag = resolver.require_release_before(&owner, &repo, &before).await?;
            println!("{tag}");
            Ok(())
        }
    }
}

/// Build the HTTP fetcher from the `github` section
fn fetcher(github: &GitHubConfig) -> Result<Arc<dyn PagedFetch>> {
    let fetcher = GitHubFetcher::new(GitHubFetcherConfig {
        api_base: github.api_base.clone(),
        token: github.token(),
        timeout: github.timeout(),
    })
    .context("Failed to initialize HTTP client")?;
    Ok(Arc::new(fetcher))
}

/// Resolver for the one-off lookup commands
///
/// Falls back to the default GitHub settings when no config file exists.
fn resolver(config_path: &Path) -> Result<HistoryResolver> {
    let github = if config_path.exists() {
        Config::load(config_path)?.github
    } else {
        GitHubConfig::default()
    };
    Ok(HistoryResolver::with_api_base(
        fetcher(&github)?,
        github.api_base.as_str(),
    ))
}

async fn run_command(config_path: &Path, now: DateTime<Utc>) -> Result<()> {
    let config = Config::load(config_path)?;
    let fetch = fetcher(&config.github)?;
    let pipeline = Pipeline::new(config, fetch);

    let output = pipeline.run(now).await.context("Run failed")?;

    let outputs = &pipeline.config().output;
    write_listing(&outputs.direct, &output.direct)?;
    write_listing(&outputs.proxied, &output.proxied)?;

    info!(
        "Wrote {} plugins (cutoff {}, {} commits and {} releases resolved)",
        output.direct.len(),
        format_cutoff(&output.plan.cutoff),
        pipeline.resolver().commit_cache().len().await,
        pipeline.resolver().release_cache().len().await
    );
    Ok(())
}

fn write_listing(path: &Path, manifests: &[Manifest]) -> Result<()> {
    let content = to_pretty_json(manifests).context("Failed to serialize listing")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write listing: {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Global")]
    global: String,
    #[tabled(rename = "CN")]
    cn: String,
    #[tabled(rename = "")]
    marker: &'static str,
}

fn plan_command(config_path: &Path, now: DateTime<Utc>) -> Result<()> {
    let config = Config::load(config_path)?;
    let plan = plan_run(&config.versions, now)?;

    let rows: Vec<VersionRow> = config
        .versions
        .iter()
        .map(|v| VersionRow {
            version: v.version.clone(),
            global: format_cutoff(&v.global),
            cn: v.cn.as_ref().map(format_cutoff).unwrap_or_else(|| "-".to_string()),
            marker: if v.version == plan.cn_version { "<- CN" } else { "" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("{table}");
    println!();
    println!("Now:      {}", format_cutoff(&now));
    println!("Cutoff:   {}", format_cutoff(&plan.cutoff));
    println!(
        "Delay sources: {}",
        if plan.cn_is_current { "stored from live" } else { "served from store" }
    );
    Ok(())
}

#[derive(Tabled)]
struct UrlRow {
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Canonical")]
    canonical: String,
}

fn classify_row(url: &str) -> UrlRow {
    let classified = GitHubUrl::classify(url);
    UrlRow {
        url: url.to_string(),
        kind: classified.kind(),
        canonical: classified.canonical().unwrap_or_else(|| "-".to_string()),
    }
}

fn classify_command(urls: &[String]) {
    let rows: Vec<UrlRow> = urls.iter().map(|u| classify_row(u)).collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("{table}");
}
