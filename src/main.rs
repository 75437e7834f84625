mod api;
mod classifier;
mod cli;
mod commands;
mod config;
mod error;
mod journal;
mod pending;
mod session;
mod stats;
mod transport;
mod validation;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{App, Command};
use session::{FileTokenStore, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use transport::HttpTransport;

#[derive(Parser)]
#[command(name = "recyclo", about = "Recycling rewards client")]
pub struct Args {
    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Rewards backend base URL (overrides RECYCLO_API_URL)")]
    pub api_url: Option<String>,

    #[arg(long, help = "Classifier base URL (overrides RECYCLO_CLASSIFIER_URL)")]
    pub classifier_url: Option<String>,

    #[arg(long, help = "Where the session tokens are stored")]
    pub session_file: Option<PathBuf>,

    #[arg(long, help = "Debug logging (same as RUST_LOG=debug)")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    // Load configuration: explicit file, or the layered defaults
    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load()?
    };
    cfg.apply_env();

    if let Some(url) = &args.api_url {
        cfg.api_url = url.clone();
    }
    if let Some(url) = &args.classifier_url {
        cfg.classifier_url = url.clone();
    }
    if let Some(path) = &args.session_file {
        cfg.session_file = path.clone();
    }

    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("Config error {}", e);
        }
        anyhow::bail!("invalid configuration");
    }

    let backend = Arc::new(HttpTransport::new(&cfg.api_url, cfg.timeout_ms));
    let store = Arc::new(FileTokenStore::new(&cfg.session_file));
    tracing::debug!(
        api = %cfg.api_url,
        classifier = %cfg.classifier_url,
        session_file = %store.path().display(),
        "starting"
    );
    let session = Arc::new(SessionManager::new(backend, store));
    let classifier =
        classifier::Classifier::new(Arc::new(HttpTransport::new(&cfg.classifier_url, cfg.timeout_ms)));

    let run_id = uuid::Uuid::new_v4().to_string();
    let journal = match &cfg.journal_dir {
        Some(dir) => Some(
            journal::Journal::open(dir, &run_id)
                .with_context(|| format!("opening journal in {}", dir.display()))?,
        ),
        None => None,
    };

    let mut app = App::new(cfg, session, classifier, journal);
    app.restore();

    match args.command {
        None | Some(Command::Shell) => cli::run_repl(&mut app),
        Some(command) => app.run(&command).map_err(|e| anyhow::anyhow!(commands::describe(&e))),
    }
}
