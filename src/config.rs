/// Configuration management for the pairchat server.
/// Handles command-line argument parsing and config structure.
use crate::error::ServerError;
use crate::router::SendPolicy;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "Pairchat Server")]
#[command(about = "Pairs anonymous clients into two-member groups and relays their messages", long_about = None)]
pub struct Config {
    /// Interface to listen on (default: 127.0.0.1)
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port (default: 8080)
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// PID file path (optional) - write server PID to this file on startup
    #[arg(long)]
    pub pidfile: Option<PathBuf>,

    /// Only let members of a group post messages to it
    #[arg(long)]
    pub require_membership: bool,

    /// Do not send permissive CORS headers
    #[arg(long)]
    pub no_cors: bool,
}

impl Config {
    /// Parse command-line arguments into Config
    pub fn from_args() -> Self {
        Config::parse()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn send_policy(&self) -> SendPolicy {
        if self.require_membership {
            SendPolicy::MembersOnly
        } else {
            SendPolicy::Open
        }
    }

    pub fn cors_enabled(&self) -> bool {
        !self.no_cors
    }

    /// Write the current process id to the configured PID file, if any
    pub fn write_pidfile(&self) -> Result<Option<&PathBuf>, ServerError> {
        let Some(path) = &self.pidfile else {
            return Ok(None);
        };
        fs::write(path, process::id().to_string()).map_err(|source| ServerError::PidFile {
            path: path.clone(),
            source,
        })?;
        Ok(Some(path))
    }
}
