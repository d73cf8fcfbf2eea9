//! Binary entry point for the chat server.

use std::path::PathBuf;

use anyhow::Result;
use chat_server::config::Config;
use chat_server::server;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "chat-server")]
#[clap(about = "Chat server for TCP and UDP clients")]
struct Cli {
    /// Address to listen on
    #[clap(short = 'l', long)]
    listen: Option<String>,

    /// Port for both listeners
    #[clap(short = 'p', long)]
    port: Option<u16>,

    /// UDP confirmation timeout in milliseconds
    #[clap(short = 'd', long)]
    timeout: Option<u64>,

    /// Maximum number of UDP retransmissions
    #[clap(short = 'r', long)]
    retransmissions: Option<u32>,

    /// Optional TOML configuration file
    #[clap(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_file(path)?,
            None => Config::default(),
        }
        .with_env()?;

        if let Some(addr) = &self.listen {
            config.bind_addr = addr.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ms) = self.timeout {
            config.confirmation_timeout_ms = ms;
        }
        if let Some(n) = self.retransmissions {
            config.max_retransmissions = n;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.load_config()?;
    info!(
        "Starting chat-server on {}:{} (confirmation timeout = {}ms, retransmissions = {})",
        config.bind_addr, config.port, config.confirmation_timeout_ms, config.max_retransmissions
    );

    server::run(config).await
}
