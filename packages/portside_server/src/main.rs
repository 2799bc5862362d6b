use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use portside_server::config::{DEFAULT_HOST, DEFAULT_PORT, FileConfig, PortsideConfig, load_config};
use portside_server::state::{ItemLauncher, NoopLauncher, ProcessLauncher};
use portside_server::store::HistoryStore;
use portside_server::{AppState, build_router, realtime};

#[derive(Parser)]
#[command(name = "portside")]
#[command(about = "Control panel for recorded proxy commands")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the panel server in the foreground
    Serve(ServeArgs),

    /// Record a command in the history store
    Add(AddArgs),

    /// Print the recorded commands
    List,
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the panel server
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Parser)]
struct AddArgs {
    /// The command to record, as it would be passed to the launcher
    raw: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PortsideConfig::new(cli.data_dir.clone())?;

    match cli.command {
        None => run_server(ServeArgs::default(), config).await,
        Some(Commands::Serve(args)) => run_server(args, config).await,
        Some(Commands::Add(args)) => {
            let store = HistoryStore::open(&config.store_path)?;
            store.append(&args.raw)?;
            println!("Recorded: {}", args.raw);
            Ok(())
        }
        Some(Commands::List) => {
            let store = HistoryStore::open(&config.store_path)?;
            for command in store.commands() {
                println!("{command}");
            }
            Ok(())
        }
    }
}

async fn run_server(args: ServeArgs, config: PortsideConfig) -> Result<()> {
    let default_directive = if args.debug {
        "portside=debug,portside_server=debug,tower_http=debug,info"
    } else {
        "portside=info,portside_server=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting Portside control panel");

    let fc: FileConfig = load_config(&config.data_dir)
        .extract()
        .context("loading configuration")?;

    let host = args
        .host
        .or(fc.server.host)
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = args.port.or(fc.server.port).unwrap_or(DEFAULT_PORT);

    let store = HistoryStore::open(&config.store_path)?;
    info!(
        commands = store.commands().len(),
        store = %config.store_path.display(),
        "history store loaded"
    );

    let launcher: Box<dyn ItemLauncher> = match fc.launcher.program {
        Some(program) => {
            info!(program = %program.display(), "item launcher configured");
            Box::new(ProcessLauncher::new(program))
        }
        None => {
            warn!("no launcher program configured; connects only track state");
            Box::new(NoopLauncher)
        }
    };

    let state = AppState::new(store, launcher);

    let ticker = realtime::spawn_ticker(
        state.hub.clone(),
        Duration::from_millis(fc.channel.heartbeat_ms),
    );

    let app = build_router(state);

    let addr = format!("{host}:{port}").parse::<SocketAddr>()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Portside listening on http://{}", actual_addr);
    info!("  GET  /                         - Panel page");
    info!("  GET  /history-commands-list    - List fragment");
    info!("  POST /connect-history-item     - Connect an item");
    info!("  POST /disconnect-history-item  - Disconnect an item");
    info!("  GET  /rt                       - Live channel");

    let shutdown_signal = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            return;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    ticker.abort();
    Ok(())
}
