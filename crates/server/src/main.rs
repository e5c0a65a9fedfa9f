//! lanbrowse
//!
//! Browse a directory over HTTP from any device on the local network.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use server::config::{default_config_path, Config, Overrides};
use server::App;

/// lanbrowse - share a directory on the local network.
#[derive(Parser, Debug)]
#[command(name = "lanbrowse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to serve
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Basic auth username (requires --pass)
    #[arg(long, value_name = "USER")]
    pub user: Option<String>,

    /// Basic auth password (requires --user)
    #[arg(long, value_name = "PASS")]
    pub pass: Option<String>,

    /// Log every request
    #[arg(long)]
    pub log_requests: bool,

    /// Directory for generated thumbnails
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Directory served under /icons/
    #[arg(long, value_name = "DIR")]
    pub icons_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            root_dir: self.dir.clone(),
            port: self.port,
            username: self.user.clone(),
            password: self.pass.clone(),
            log_requests: self.log_requests,
            cache_dir: self.cache_dir.clone(),
            icons_dir: self.icons_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();
    config.apply_overrides(cli.overrides());

    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.server.log_level.to_lowercase()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate().context("Invalid configuration")?;

    App::new(config)?.run().await
}
