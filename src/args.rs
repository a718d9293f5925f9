use clap::Parser;
use std::path::PathBuf;

use crate::config;

#[derive(Parser, Debug)]
#[command(name = "peerview")]
#[command(author = "Peerview Team")]
#[command(version = "0.1.0")]
#[command(about = "Headless WebRTC viewer client", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/peerview.toml")]
    pub config: PathBuf,

    /// Signaling server URL (e.g., "ws://localhost:8000")
    #[arg(short, long)]
    pub url: Option<String>,

    /// Stream name to request once the data channel opens
    #[arg(short, long)]
    pub stream: Option<String>,

    /// Send ICE candidates as they are gathered instead of waiting
    /// for gathering to finish before answering
    #[arg(long, action)]
    pub trickle: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }
}
