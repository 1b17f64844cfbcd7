//! tinyq command-line interface.
//!
//! `tinyq serve` runs the daemon; every other command talks to a running
//! daemon over HTTP using the `[worker]` section of `tinyq.toml`, overridden
//! by `--url`, `--app` and `--token`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tinyq::client::{ClientOptions, WebClient, Worker, WorkerContext};
use tinyq::config::Config;
use tinyq::daemon::http;

#[derive(Parser, Debug)]
#[command(name = "tinyq", version)]
#[command(about = "Multi-tenant, disk-persisted work queue")]
struct Cli {
    /// Config file (default: ~/.tinyq/tinyq.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Server URL for client commands
    #[arg(long, global = true)]
    url: Option<String>,

    /// Application for client commands
    #[arg(long, global = true)]
    app: Option<String>,

    /// Token forwarded to the server
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP daemon
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind
        #[arg(long)]
        host: Option<String>,
        /// Store directory
        #[arg(long)]
        root: Option<PathBuf>,
        /// Disable the /metrics endpoint
        #[arg(long)]
        no_metrics: bool,
    },
    /// Push an item (`channel.key[.payload]`)
    Push { item: String },
    /// Pop up to COUNT items from a channel
    Pop {
        channel: String,
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
    /// Remove a single item without popping
    Ack { item: String },
    /// Number of items in a channel
    Count { channel: String },
    /// List channels with counts and flags
    Channels,
    /// Per-channel statistics as JSON
    Stats,
    /// List applications known to the server
    Apps,
    /// Stop pops from a channel
    Pause { channel: String },
    /// Allow pops from a channel again
    Resume { channel: String },
    /// Protect a channel from clear and delete
    Lock { channel: String },
    /// Remove a channel's lock
    Unlock { channel: String },
    /// Remove every item of a channel
    Clear { channel: String },
    /// Drop a channel
    Delete { channel: String },
    /// Per-application key/value entries
    Kv {
        #[command(subcommand)]
        command: KvCommand,
    },
    /// Poll a channel and print (or forward) each item until Ctrl+C
    Worker {
        channel: String,
        /// Push every item on to this channel
        #[arg(long)]
        forward_to: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum KvCommand {
    Get { key: String },
    Set { key: String, value: String },
    Delete { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    init_logging(&config.server.log_level, cli.json_logs);

    let validation = config.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    match cli.command {
        Commands::Serve {
            port,
            host,
            root,
            no_metrics,
        } => {
            let mut server = config.server;
            if let Some(port) = port {
                server.port = port;
            }
            if let Some(host) = host {
                server.host = host;
            }
            if root.is_some() {
                server.root = root;
            }
            if no_metrics {
                server.metrics = false;
            }
            http::serve(&server).await
        },
        command => {
            let mut options = ClientOptions::from(&config.worker);
            if let Some(url) = cli.url {
                options.url = url;
            }
            if let Some(app) = cli.app {
                options.application = app;
            }
            if cli.token.is_some() {
                options.token = cli.token;
            }
            let client = WebClient::new(options)?;
            run_client(&client, command).await
        },
    }
}

async fn run_client(client: &WebClient, command: Commands) -> Result<()> {
    match command {
        Commands::Serve { .. } => anyhow::bail!("serve does not run against a remote server"),
        Commands::Push { item } => {
            client.push(&item).await?;
            println!("ok");
        },
        Commands::Pop { channel, count } => {
            for item in client.pop_many(&channel, count).await? {
                println!("{item}");
            }
        },
        Commands::Ack { item } => client.ack(&item).await?,
        Commands::Count { channel } => println!("{}", client.count(&channel).await?),
        Commands::Channels => {
            for channel in client.channels().await? {
                let mut flags = Vec::new();
                if channel.paused {
                    flags.push("paused");
                }
                if channel.locked {
                    flags.push("locked");
                }
                println!("{:<32} {:>8}  {}", channel.name, channel.count, flags.join(","));
            }
        },
        Commands::Stats => {
            let stats = client.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        },
        Commands::Apps => {
            for app in client.databases().await? {
                println!("{app}");
            }
        },
        Commands::Pause { channel } => client.pause(&channel).await?,
        Commands::Resume { channel } => client.resume(&channel).await?,
        Commands::Lock { channel } => client.lock(&channel).await?,
        Commands::Unlock { channel } => client.unlock(&channel).await?,
        Commands::Clear { channel } => client.clear(&channel).await?,
        Commands::Delete { channel } => client.delete(&channel).await?,
        Commands::Kv { command } => match command {
            KvCommand::Get { key } => match client.kv_get(&key).await? {
                Some(value) => println!("{value}"),
                None => anyhow::bail!("Key '{key}' not found"),
            },
            KvCommand::Set { key, value } => client.kv_set(&key, &value).await?,
            KvCommand::Delete { key } => client.kv_delete(&key).await?,
        },
        Commands::Worker {
            channel,
            forward_to,
        } => run_worker(client, channel, forward_to).await?,
    }
    Ok(())
}

async fn run_worker(client: &WebClient, channel: String, forward_to: Option<String>) -> Result<()> {
    let worker = Worker::new(Arc::new(client.clone()), channel, client.backoff());
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping after the current item");
            stopper.cancel();
        }
    });

    let forward_to: Option<Arc<str>> = forward_to.map(Into::into);
    let summary = worker
        .run(
            move |ctx: WorkerContext| {
                let forward_to = forward_to.clone();
                async move {
                    println!("{}", ctx.item());
                    let next = match forward_to.as_deref() {
                        Some(target) => Some(
                            ctx.route_to(target)
                                .context("Failed to build forwarded item")?,
                        ),
                        None => None,
                    };
                    anyhow::Ok(next)
                }
            },
            cancel,
        )
        .await;

    info!(
        processed = summary.processed,
        failed = summary.failed,
        chained = summary.chained,
        "Worker finished"
    );
    Ok(())
}

/// Initialize logging for the CLI. Logs go to stderr so command output on
/// stdout stays scriptable.
fn init_logging(default_level: &str, json: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}
