//! SpaceSink CLI: run the space/governance sink and manage its store.
//!
//! # Commands
//! ```text
//! spacesink start   --database-url <url> --endpoint <https://...> --package <file.spkg> [--start-block N] [--stop-block N]
//! spacesink status  --database-url <url>
//! spacesink reset   --database-url <url> --yes
//! spacesink info
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use spacesink_core::config::SinkConfig;
use spacesink_storage::Backend;
use spacesink_stream::ipfs::DEFAULT_GATEWAY;
use spacesink_stream::{BlockStream, IpfsGatewayFetcher, SinkBuilder, SubstreamsStream, WsBlockStream};

mod logging;
mod settings;

use logging::{init_tracing, LogConfig};
use settings::FileSettings;

const DEFAULT_DATABASE_URL: &str = "sqlite:./spacesink.db";
const DEFAULT_OUTPUT_MODULE: &str = "map_sink_output";

#[derive(Parser)]
#[command(
    name = "spacesink",
    about = "Reorg-safe sink for space and governance events",
    long_about = "
SpaceSink: consumes a cursor-based block stream of space, membership and
governance events, resolves referenced IPFS content, and projects the result
into a relational store that can be rolled back on chain reorganisations.

ENVIRONMENT VARIABLES:
  SPACESINK_CONFIG              YAML settings file
  SPACESINK_DATABASE_URL        memory | sqlite:<path> | postgres://...
  SPACESINK_ENDPOINT            Substreams gRPC (http/https) or WebSocket (ws/wss) endpoint
  SPACESINK_API_TOKEN           Bearer token for the block stream
  SPACESINK_PACKAGE             Substreams package (.spkg) for gRPC endpoints
  SPACESINK_MODULE              Output module to stream
  SPACESINK_IPFS_GATEWAY        IPFS HTTP gateway base URL
  SPACESINK_NETWORK             Network name mixed into space ids
  SPACESINK_LOG_LEVEL           trace | debug | info | warn | error
  SPACESINK_LOG_JSON            Emit JSON logs (true/false)
",
    version
)]
struct Cli {
    /// YAML settings file; flags and env vars override its values
    #[arg(short, long, global = true, env = "SPACESINK_CONFIG")]
    config: Option<PathBuf>,

    /// Store URL: memory, sqlite:<path>, or postgres://...
    #[arg(long, global = true, env = "SPACESINK_DATABASE_URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(long, global = true, env = "SPACESINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit JSON structured logs
    #[arg(long, global = true, env = "SPACESINK_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream blocks into the store until stopped
    Start(StartArgs),

    /// Print the persisted cursor and row counts
    Status,

    /// Delete all projected rows, the journal, the content cache and the cursor
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Show version and capabilities
    Info,
}

#[derive(clap::Args)]
struct StartArgs {
    /// Substreams gRPC (http/https) or WebSocket (ws/wss) endpoint
    #[arg(long, env = "SPACESINK_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer token for the block stream
    #[arg(long, env = "SPACESINK_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Substreams package (.spkg); required for gRPC endpoints
    #[arg(long, env = "SPACESINK_PACKAGE")]
    package: Option<PathBuf>,

    /// Output module to stream
    #[arg(long, env = "SPACESINK_MODULE")]
    module: Option<String>,

    /// IPFS HTTP gateway base URL
    #[arg(long, env = "SPACESINK_IPFS_GATEWAY")]
    ipfs_gateway: Option<String>,

    /// Network name mixed into space ids
    #[arg(long, env = "SPACESINK_NETWORK")]
    network: Option<String>,

    /// First block on a fresh store (ignored once a cursor exists)
    #[arg(long, env = "SPACESINK_START_BLOCK")]
    start_block: Option<u64>,

    /// Stop after committing this block
    #[arg(long, env = "SPACESINK_STOP_BLOCK")]
    stop_block: Option<u64>,

    /// Parallel IPFS fetches per block
    #[arg(long, env = "SPACESINK_CONTENT_CONCURRENCY")]
    content_concurrency: Option<usize>,

    /// Halt on events that reference unknown spaces
    #[arg(long, env = "SPACESINK_STRICT")]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => FileSettings::load(path)?,
        None => FileSettings::default(),
    };

    let mut log = file.log.clone();
    apply_log_flags(&mut log, cli.log_level.clone(), cli.log_json);
    init_tracing(&log);

    let database_url = cli
        .database_url
        .clone()
        .or_else(|| file.database_url.clone())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

    match cli.command {
        Commands::Start(args) => cmd_start(args, file, &database_url).await,
        Commands::Status => cmd_status(&database_url).await,
        Commands::Reset { yes } => cmd_reset(&database_url, yes).await,
        Commands::Info => cmd_info(),
    }
}

fn apply_log_flags(log: &mut LogConfig, level: Option<String>, json: bool) {
    if let Some(level) = level {
        log.level = level;
    }
    if json {
        log.json = true;
    }
}

/// Flags win over file values, which win over defaults.
fn merge_sink_config(mut config: SinkConfig, args: &StartArgs) -> SinkConfig {
    if let Some(network) = &args.network {
        config.network = network.clone();
    }
    if args.start_block.is_some() {
        config.start_block = args.start_block;
    }
    if args.stop_block.is_some() {
        config.stop_block = args.stop_block;
    }
    if let Some(n) = args.content_concurrency {
        config.content_concurrency = n;
    }
    if args.strict {
        config.strict_references = true;
    }
    config
}

// ─── Command implementations ──────────────────────────────────────────────────

async fn cmd_start(args: StartArgs, file: FileSettings, database_url: &str) -> Result<()> {
    let config = merge_sink_config(file.sink.clone(), &args);
    config.validate().context("Invalid sink configuration")?;

    let stream = build_stream(&args, &file, config.stop_block)?;
    let gateway = args
        .ipfs_gateway
        .clone()
        .or(file.ipfs_gateway)
        .unwrap_or_else(|| DEFAULT_GATEWAY.to_string());

    let backend = Backend::open(database_url)
        .await
        .with_context(|| format!("Cannot open store at {database_url}"))?;
    info!(backend = backend.name(), network = %config.network, "Store opened");

    let fetcher = IpfsGatewayFetcher::new(gateway).context("Invalid IPFS gateway")?;

    let mut driver = SinkBuilder::from_config(config)
        .driver(
            stream,
            backend.sink_store(),
            backend.cache_store(),
            Arc::new(fetcher),
        )
        .await
        .context("Cannot start sink")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current block");
            on_signal.cancel();
        }
    });

    let stats = driver.run(cancel).await.context("Sink halted")?;
    println!(
        "Stopped: {} blocks applied, {} undos, {} invalid events, {} reconnects",
        stats.blocks_applied, stats.undos_applied, stats.invalid_events, stats.reconnects
    );
    if let Some(cursor) = driver.sink().cursor() {
        println!("Cursor:  block {} ({})", cursor.block_number, cursor.block_hash);
    }
    Ok(())
}

/// ws/wss endpoints get the WebSocket client; anything else is Substreams gRPC.
fn build_stream(args: &StartArgs, file: &FileSettings, stop_block: Option<u64>) -> Result<Box<dyn BlockStream>> {
    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| file.stream.endpoint.clone())
        .context("No stream endpoint: pass --endpoint or set SPACESINK_ENDPOINT")?;
    let api_token = args.api_token.clone().or_else(|| file.stream.api_token.clone());

    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        let mut stream = WsBlockStream::new(endpoint);
        if let Some(token) = api_token {
            stream = stream.with_api_token(token);
        }
        if let Some(stop) = stop_block {
            stream = stream.with_stop_block(stop);
        }
        return Ok(Box::new(stream));
    }

    let package = args
        .package
        .clone()
        .or_else(|| file.stream.package.clone())
        .context("No substreams package: pass --package or set SPACESINK_PACKAGE")?;
    let module = args
        .module
        .clone()
        .or_else(|| file.stream.module.clone())
        .unwrap_or_else(|| DEFAULT_OUTPUT_MODULE.to_string());

    let mut stream = SubstreamsStream::from_package_file(endpoint, &package, module)
        .context("Cannot load substreams package")?;
    if let Some(token) = api_token {
        stream = stream.with_api_token(token);
    }
    if let Some(stop) = stop_block {
        stream = stream.with_stop_block(stop);
    }
    Ok(Box::new(stream))
}

async fn cmd_status(database_url: &str) -> Result<()> {
    let backend = Backend::open(database_url)
        .await
        .with_context(|| format!("Cannot open store at {database_url}"))?;

    println!("Store:   {} ({})", backend.name(), database_url);
    match backend
        .sink_store()
        .load_cursor()
        .await
        .context("Cannot read cursor")?
    {
        Some(cursor) => {
            println!("Cursor:  block {}", cursor.block_number);
            println!("         hash  {}", cursor.block_hash);
            println!("         token {}", cursor.token);
        }
        None => println!("Cursor:  none (fresh store)"),
    }

    println!();
    println!("Rows:");
    for (table, count) in backend.table_counts().await.context("Cannot count rows")? {
        println!("  {:<24} {}", table.name(), count);
    }
    Ok(())
}

async fn cmd_reset(database_url: &str, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to reset {database_url} without --yes");
    }
    let backend = Backend::open(database_url)
        .await
        .with_context(|| format!("Cannot open store at {database_url}"))?;
    backend
        .sink_store()
        .reset()
        .await
        .context("Reset failed")?;
    println!("✓ Store reset: {} ({})", backend.name(), database_url);
    Ok(())
}

fn cmd_info() -> Result<()> {
    println!("SpaceSink v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Capabilities:");
    println!("  ✓ Block stream            (Substreams gRPC or WebSocket, bearer auth, cursor resume)");
    println!("  ✓ Reorg handling          (undo signals, per-block rollback journal)");
    println!("  ✓ Event decoding          (protobuf, per-entry error isolation)");
    println!("  ✓ IPFS content            (HTTP gateway, two-tier cache)");
    println!("  ✓ Identity                (EIP-55 checksums, derived space/proposal ids)");
    println!();
    println!("Stores:                     memory, sqlite, postgres");
    println!("Events:                     spaces, editors, members, subspaces,");
    println!("                            votes, proposal lifecycle, membership requests, profiles");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_args(argv: &[&str]) -> StartArgs {
        let mut full = vec!["spacesink", "start"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Start(args) => args,
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_file_config() {
        let file = SinkConfig {
            network: "FILE".into(),
            start_block: Some(10),
            content_concurrency: 4,
            ..SinkConfig::default()
        };
        let args = start_args(&["--network", "FLAG", "--stop-block", "99", "--strict"]);
        let merged = merge_sink_config(file, &args);

        assert_eq!(merged.network, "FLAG");
        assert_eq!(merged.start_block, Some(10));
        assert_eq!(merged.stop_block, Some(99));
        assert_eq!(merged.content_concurrency, 4);
        assert!(merged.strict_references);
    }

    #[test]
    fn websocket_endpoint_needs_no_package() {
        let args = start_args(&["--endpoint", "wss://stream.example/sink"]);
        assert!(build_stream(&args, &FileSettings::default(), None).is_ok());
    }

    #[test]
    fn grpc_endpoint_requires_package() {
        let args = start_args(&["--endpoint", "https://substreams.example:443"]);
        let err = build_stream(&args, &FileSettings::default(), None).err().unwrap();
        assert!(err.to_string().contains("package"));

        let args = start_args(&[
            "--endpoint",
            "https://substreams.example:443",
            "--package",
            "/nonexistent/spaces.spkg",
        ]);
        assert!(build_stream(&args, &FileSettings::default(), None).is_err());
    }

    #[test]
    fn log_flags_override_file() {
        let mut log = LogConfig::default();
        apply_log_flags(&mut log, Some("debug".into()), true);
        assert_eq!(log.level, "debug");
        assert!(log.json);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "spacesink",
            "status",
            "--database-url",
            "memory",
        ])
        .unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("memory"));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[tokio::test]
    async fn reset_requires_confirmation() {
        assert!(cmd_reset("memory", false).await.is_err());
        assert!(cmd_reset("memory", true).await.is_ok());
    }
}
