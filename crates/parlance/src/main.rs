use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File, FileFormat};
use log::{LevelFilter, debug, info};
use serde::Deserialize;
use tokio::net::TcpListener;

use parlance::agent::EchoAgent;
use parlance::api::{self, AppState};
use parlance::db::Database;
use parlance::prompt::{NoMemory, PromptComposer};

const APP_NAME: &str = "parlance";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common);

    let settings = load_settings(&cli.common)?;
    debug!("resolved settings: {settings:#?}");

    match cli.command {
        Command::Serve(cmd) => async_serve(settings, cmd),
    }
}

#[tokio::main]
async fn async_serve(settings: Settings, cmd: ServeCommand) -> Result<()> {
    serve(settings, cmd).await
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Parlance - conversational AI assistant backend.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP/WebSocket server
    Serve(ServeCommand),
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Bind host (overrides config)
    #[arg(long)]
    host: Option<String>,
    /// Bind port (overrides config)
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
struct Settings {
    host: String,
    port: u16,
    database_path: PathBuf,
    /// Base system prompt; the per-run prompt is composed from this plus
    /// the user profile and retrieved memory.
    #[serde(default)]
    base_prompt: Option<String>,
}

fn effective_log_level(opts: &CommonOpts) -> LevelFilter {
    if opts.trace {
        LevelFilter::Trace
    } else if opts.debug {
        LevelFilter::Debug
    } else if opts.quiet {
        LevelFilter::Error
    } else {
        match opts.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn init_logging(opts: &CommonOpts) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = effective_log_level(opts);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parlance={level},tower_http={level}")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();

    // Also init env_logger for compatibility with log crate users
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_level(level)
        .try_init()
        .ok();
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("parlance.db")
}

fn load_settings(opts: &CommonOpts) -> Result<Settings> {
    let mut builder = Config::builder()
        .set_default("host", "127.0.0.1")?
        .set_default("port", 8480)?
        .set_default(
            "database_path",
            default_database_path().to_string_lossy().to_string(),
        )?;

    let config_path = opts.config.clone().or_else(|| {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
    });
    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
    }

    builder
        .add_source(Environment::with_prefix("PARLANCE"))
        .build()
        .context("loading configuration")?
        .try_deserialize()
        .context("parsing configuration")
}

async fn serve(settings: Settings, cmd: ServeCommand) -> Result<()> {
    let db = Database::open(&settings.database_path).await?;
    info!("database ready at {}", settings.database_path.display());

    let prompts = match &settings.base_prompt {
        Some(base) => PromptComposer::new(base.clone(), Arc::new(NoMemory)),
        None => PromptComposer::with_defaults(),
    };

    let state = AppState::new(db, Arc::new(EchoAgent::new()), Arc::new(prompts));
    let router = api::create_router(state);

    let host = cmd.host.unwrap_or(settings.host);
    let port = cmd.port.unwrap_or(settings.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, router)
        .await
        .context("serving HTTP")?;

    Ok(())
}
