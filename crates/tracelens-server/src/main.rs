use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracelens::protocol::{Trace, TraceId};
use tracelens::{Config, HttpTraceSource, LoadOutcome, TraceLoader, TraceViews, TracingNotifier};
use tracelens_server::views::{self, Participants, ViewKind};
use tracing_subscriber::EnvFilter;

/// Environment variable naming the config file
const CONFIG_ENV: &str = "TRACELENS_CONFIG";

#[derive(Parser)]
#[command(name = "tracelens")]
#[command(about = "Trace views: span trees, agent graphs, sequence diagrams", long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults to $TRACELENS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve traces and derived views over HTTP
    Serve {
        #[arg(short, long, default_value = "1990")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// TTL for traces in seconds
        #[arg(long, default_value = "3600")]
        ttl: u64,

        /// Load seed data on startup for UI development
        #[arg(long)]
        seed: bool,
    },

    /// Print a derived view of a trace stored as JSON
    Inspect {
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = ViewKind::Spans)]
        view: ViewKind,

        #[arg(long, value_enum, default_value_t = Participants::Span)]
        participants: Participants,
    },

    /// Fetch a trace from a telemetry API and print a derived view
    Fetch {
        trace_id: String,

        /// Base URL of the API (defaults to $TRACELENS_API_URL)
        #[arg(long)]
        url: Option<String>,

        #[arg(long, value_enum, default_value_t = ViewKind::Spans)]
        view: ViewKind,

        #[arg(long, value_enum, default_value_t = Participants::Span)]
        participants: Participants,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Serve { port, host, ttl, seed } => {
            let server = tracelens_server::run_server(host, port, ttl, seed, config);
            tokio::select! {
                result = server => result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    Ok(())
                }
            }
        }
        Commands::Inspect {
            file,
            view,
            participants,
        } => {
            let trace = read_trace(&file)?;
            let views = TraceViews::new(Arc::new(trace), Arc::new(config));
            println!("{}", views::render(&views, view, participants)?);
            Ok(())
        }
        Commands::Fetch {
            trace_id,
            url,
            view,
            participants,
        } => {
            let mut fetch = config.fetch.clone();
            if url.is_some() {
                fetch.base_url = url;
            }
            let source = HttpTraceSource::from_config(&fetch).context("set --url or TRACELENS_API_URL")?;
            let loader = TraceLoader::new(source, TracingNotifier, fetch.retry.clone());

            match loader.load(&TraceId::new(trace_id)).await {
                LoadOutcome::Applied(trace) => {
                    let views = TraceViews::new(trace, Arc::new(config));
                    println!("{}", views::render(&views, view, participants)?);
                    Ok(())
                }
                LoadOutcome::Failed(err) => Err(err.into()),
                LoadOutcome::Stale => anyhow::bail!("request superseded"),
            }
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let mut config = match path {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    config.apply_env_overrides();
    Ok(config)
}

fn read_trace(path: &Path) -> anyhow::Result<Trace> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let fallback_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "trace".to_string());
    views::parse_trace(&contents, &fallback_id).with_context(|| format!("invalid trace file {}", path.display()))
}
