mod cli;
mod config;
mod server;

use clap::{ArgAction, Parser, Subcommand};
use crate::cli::Client;
use crate::config::Config;
use crate::server::{block_store_router, metadata_store_router, serve};
use std::path::PathBuf;
use std::sync::Arc;
use surfs_core::{
    BlockEngineBuilder, BlockStore, BlockStoreClient, MetadataEngineBuilder, MetadataStore,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "surfs")]
#[command(about = "Content-addressed file storage with versioned metadata")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Increase log verbosity (-V for debug, -VV for trace)
    #[arg(short = 'V', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a block store
    BlockServer {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for block files
        #[arg(short = 'D', long, value_parser = existing_dir)]
        datadir: Option<PathBuf>,

        /// Storage engine: disk or memory
        #[arg(long)]
        engine: Option<String>,
    },
    /// Run a metadata store
    MetaServer {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for the metadata database
        #[arg(short = 'D', long, value_parser = existing_dir)]
        datadir: Option<PathBuf>,

        /// Storage engine: sqlite or memory
        #[arg(long)]
        engine: Option<String>,

        /// Block store host
        #[arg(short = 'H', long)]
        block_store_hostname: Option<String>,

        /// Block store port
        #[arg(short = 'P', long)]
        block_store_port: Option<u16>,
    },
    /// Upload a local file
    Create { src: PathBuf, dest: String },
    /// Download a stored file
    Read { src: String, dest: PathBuf },
    /// Delete a stored file
    Delete { file: String },
    /// Print the current version of a stored file
    GetVersion { file: String },
}

fn existing_dir(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("{} is not an existing directory", value))
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let default_filter = format!(
        "surfs_core={level},surfs_server={level},tower_http={level}"
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    match run(cli.command, cfg).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns false when the command ran but reported failure to the user
async fn run(command: Commands, mut cfg: Config) -> anyhow::Result<bool> {
    match command {
        Commands::BlockServer {
            port,
            datadir,
            engine,
        } => {
            if let Some(port) = port {
                cfg.block_store.port = port;
            }
            if let Some(datadir) = datadir {
                cfg.block_store.data_dir = datadir;
            }
            if let Some(engine) = engine {
                cfg.block_store.engine = engine;
            }
            cfg.validate()?;

            tracing::info!(
                "Starting block store with {} engine at {:?}",
                cfg.block_store.engine,
                cfg.block_store.data_dir
            );

            let engine = BlockEngineBuilder::new()
                .backend(&cfg.block_store.engine)
                .data_dir(&cfg.block_store.data_dir)
                .build()?;
            let store = Arc::new(BlockStore::new(engine));

            serve(block_store_router(store), cfg.block_store.port).await?;
            Ok(true)
        }
        Commands::MetaServer {
            port,
            datadir,
            engine,
            block_store_hostname,
            block_store_port,
        } => {
            if let Some(port) = port {
                cfg.metadata_store.port = port;
            }
            if let Some(datadir) = datadir {
                cfg.metadata_store.data_dir = datadir;
            }
            if let Some(engine) = engine {
                cfg.metadata_store.engine = engine;
            }
            if let Some(host) = block_store_hostname {
                cfg.block_store.host = host;
            }
            if let Some(port) = block_store_port {
                cfg.block_store.port = port;
            }
            cfg.validate()?;

            tracing::info!(
                "Starting metadata store with {} engine at {:?}, block store at {}",
                cfg.metadata_store.engine,
                cfg.metadata_store.data_dir,
                cfg.block_store.address()
            );

            let engine = MetadataEngineBuilder::new()
                .backend(&cfg.metadata_store.engine)
                .data_dir(&cfg.metadata_store.data_dir)
                .build()?;
            let blocks = Arc::new(BlockStoreClient::new(
                &cfg.block_store.address(),
                cfg.client.request_timeout(),
            )?);
            let store = MetadataStore::new(engine, blocks)
                .with_presence_check_concurrency(cfg.metadata_store.presence_check_concurrency);

            serve(metadata_store_router(Arc::new(store)), cfg.metadata_store.port).await?;
            Ok(true)
        }
        Commands::Create { src, dest } => report(Client::connect(cfg)?.create(&src, &dest).await?),
        Commands::Read { src, dest } => report(Client::connect(cfg)?.read(&src, &dest).await?),
        Commands::Delete { file } => report(Client::connect(cfg)?.delete(&file).await?),
        Commands::GetVersion { file } => {
            report(Client::connect(cfg)?.get_version(&file).await?)
        }
    }
}

fn report(output: cli::CommandOutput) -> anyhow::Result<bool> {
    if let Some(message) = output.message() {
        println!("{}", message);
    }
    Ok(output.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_commands() {
        let cli = Cli::try_parse_from(["surfs", "-VV", "create", "a.txt", "remote.txt"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Create { ref dest, .. } if dest == "remote.txt"));

        let cli = Cli::try_parse_from(["surfs", "get-version", "remote.txt", "-c", "surfs.toml"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some("surfs.toml"));
        assert!(matches!(cli.command, Commands::GetVersion { ref file } if file == "remote.txt"));
    }

    #[test]
    fn test_parse_server_commands() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().to_str().unwrap();

        let cli = Cli::try_parse_from([
            "surfs",
            "meta-server",
            "-p",
            "7001",
            "-D",
            dir,
            "-H",
            "blocks.internal",
            "-P",
            "7000",
        ])
        .unwrap();
        match cli.command {
            Commands::MetaServer {
                port,
                block_store_hostname,
                block_store_port,
                ..
            } => {
                assert_eq!(port, Some(7001));
                assert_eq!(block_store_hostname.as_deref(), Some("blocks.internal"));
                assert_eq!(block_store_port, Some(7000));
            }
            _ => panic!("expected meta-server"),
        }

        assert!(
            Cli::try_parse_from(["surfs", "block-server", "-D", "/nonexistent/surfs-data"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["surfs", "delete"]).is_err());
    }

    #[tokio::test]
    async fn test_server_flags_are_validated() {
        let cli = Cli::try_parse_from(["surfs", "block-server", "-p", "0", "--engine", "memory"])
            .unwrap();
        let error = run(cli.command, Config::default()).await.unwrap_err();
        assert!(error.to_string().contains("port cannot be 0"));

        let cli = Cli::try_parse_from(["surfs", "meta-server", "--engine", "memory", "-H", " "])
            .unwrap();
        let error = run(cli.command, Config::default()).await.unwrap_err();
        assert!(error.to_string().contains("host cannot be empty"));
    }
}
