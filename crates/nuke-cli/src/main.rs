//! gcp-nuke CLI tool.

use clap::Parser;
use nuke_config::Settings;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "gcp-nuke", version)]
#[command(about = "The GCP project cleanup tool with added radiation", long_about = None)]
#[command(after_help = "e.g. gcp-nuke --project test-nuke-262510 --dry-run")]
struct Cli {
    /// GCP project id to nuke
    #[arg(short, long, env = "GCP_PROJECT_ID")]
    project: Option<String>,

    /// Report what would be deleted without deleting anything
    #[arg(short, long)]
    dry_run: bool,

    /// Timeout for removal of a single resource kind, in seconds [default: 400]
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Time between deletion status checks, in seconds [default: 10]
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Settings file [default: nuke.kdl, if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Zone to tear down, instead of every zone of the project (repeatable)
    #[arg(long = "zone")]
    zones: Vec<String>,

    /// Region to tear down, instead of every region of the project (repeatable)
    #[arg(long = "region")]
    regions: Vec<String>,

    /// OAuth access token [default: gcloud auth print-access-token]
    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Print the resource kinds and their dependencies, then exit
    #[arg(long)]
    list_kinds: bool,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            project: self.project.clone(),
            timeout: self.timeout.map(Duration::from_secs),
            poll_interval: self.poll_interval.map(Duration::from_secs),
            dry_run: self.dry_run.then_some(true),
            zones: self.zones.clone(),
            regions: self.regions.clone(),
            exclude: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let file_settings = commands::load_settings(cli.config.as_deref())?;

    if cli.list_kinds {
        return commands::list_kinds(&file_settings.exclude);
    }

    let settings = file_settings.merge(cli.settings());
    commands::nuke::run(settings, cli.access_token, cli.json).await
}
