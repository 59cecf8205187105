//! KeyVal CLI Client
//!
//! Command-line interface for a KeyVal server.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use keyval_client::{ClientConfig, KeyvalClient, DEFAULT_PORT};

/// KeyVal CLI
#[derive(Parser, Debug)]
#[command(name = "keyval")]
#[command(about = "Unix-style key=value storage over mutual TLS")]
struct Args {
    /// Server host
    #[arg(long, env = "KEYVAL_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, env = "KEYVAL_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Name expected in the server certificate (defaults to the host)
    #[arg(long, env = "KEYVAL_SERVER_NAME")]
    server_name: Option<String>,

    /// Client certificate (PEM)
    #[arg(short, long, env = "KEYVAL_CERT", default_value = "client.crt")]
    cert: PathBuf,

    /// Client private key (PEM)
    #[arg(short, long, env = "KEYVAL_KEY", default_value = "client.key")]
    key: PathBuf,

    /// CA bundle used to verify the server (PEM)
    #[arg(short = 'r', long, alias = "CAcert", env = "KEYVAL_CA", default_value = "ca.crt")]
    ca: PathBuf,

    /// Connect and request timeout in seconds
    #[arg(short, long, env = "KEYVAL_TIMEOUT", default_value_t = 20)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set, or `key=value`
        key: String,

        /// The value to set
        value: Option<String>,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Load entries from a JSON document
    Import {
        /// Read the document from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Dump all entries as a JSON document
    Export {
        /// Write the document to this file instead of stdout
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = client_config(&args);
    let endpoint = config.endpoint();
    tracing::debug!(%endpoint, server_name = config.server_name(), "connecting");
    let client = KeyvalClient::connect_with(config)
        .await
        .with_context(|| format!("failed to connect to {}", endpoint))?;

    let outcome = execute(&client, args.command).await;
    client.close().await;
    outcome
}

async fn execute(client: &KeyvalClient, command: Commands) -> Result<()> {
    match command {
        Commands::Get { key } => {
            let key = non_empty_key(&key)?;
            let value = client.get(key).await.context("get failed")?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(&value)?;
            stdout.write_all(b"\n")?;
        }
        Commands::Set { key, value } => {
            let (key, value) = split_pair(&key, value.as_deref())?;
            client.set(key, value).await.context("set failed")?;
        }
        Commands::Del { key } => {
            let key = non_empty_key(&key)?;
            client.del(key).await.context("del failed")?;
        }
        Commands::Import { file } => {
            let document = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut text = String::new();
                    io::stdin()
                        .read_to_string(&mut text)
                        .context("failed to read stdin")?;
                    text
                }
            };
            client.import(document).await.context("import failed")?;
        }
        Commands::Export { file } => {
            let document = client.export().await.context("export failed")?;
            match file {
                Some(path) => std::fs::write(&path, &document)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => {
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(&document)?;
                    stdout.write_all(b"\n")?;
                }
            }
        }
    }
    Ok(())
}

fn client_config(args: &Args) -> ClientConfig {
    let timeout = Duration::from_secs(args.timeout);
    let mut builder = ClientConfig::builder()
        .host(args.host.clone())
        .port(args.port)
        .cert_path(args.cert.clone())
        .key_path(args.key.clone())
        .ca_path(args.ca.clone())
        .connect_timeout(timeout)
        .request_timeout(timeout);
    if let Some(name) = &args.server_name {
        builder = builder.server_name(name.clone());
    }
    builder.build()
}

fn non_empty_key(key: &str) -> Result<&[u8]> {
    if key.is_empty() {
        bail!("key must not be empty");
    }
    Ok(key.as_bytes())
}

/// Accepts `set key value` as well as `set key=value`.
fn split_pair<'a>(key: &'a str, value: Option<&'a str>) -> Result<(&'a [u8], &'a [u8])> {
    let (key, value) = match value {
        Some(value) => (key, value),
        None => match key.split_once('=') {
            Some(pair) => pair,
            None => bail!("missing value for key '{}'", key),
        },
    };
    Ok((non_empty_key(key)?, value.as_bytes()))
}
