//! Startup configuration
//!
//! Command-line flags, each with an environment fallback. A `.env` file in
//! the working directory is loaded before parsing.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use formsheet_sheets::config::DEFAULT_SPREADSHEET_ID;
use formsheet_sheets::SheetsConfig;

use crate::server::ServerConfig;

#[derive(Parser, Debug)]
#[command(name = "formsheet-server")]
#[command(version)]
#[command(about = "Records website enquiries and newsletter sign-ups in a Google Sheet", long_about = None)]
pub struct Args {
    /// Address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Service-account key file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS", default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Spreadsheet receiving the rows
    #[arg(long, env = "SPREADSHEET_ID", default_value = DEFAULT_SPREADSHEET_ID)]
    pub spreadsheet_id: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,
}

impl Args {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            addr: SocketAddr::new(self.host, self.port),
        }
    }

    pub fn sheets_config(&self) -> SheetsConfig {
        SheetsConfig::new(self.spreadsheet_id.clone(), self.credentials.clone())
    }
}
