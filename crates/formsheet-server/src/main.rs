mod config;
mod enquiry;
mod handlers;
mod logging;
mod server;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use formsheet_sheets::SheetsAppender;
use tracing::info;

use config::Args;
use server::{AppState, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine; real environment variables still apply.
    dotenv::dotenv().ok();

    let args = Args::parse();
    logging::init_logging(&args.log_level, args.json_logs);

    let sheets_config = args.sheets_config();
    info!(
        "Writing to spreadsheet {} with credentials from {}",
        sheets_config.spreadsheet_id,
        sheets_config.credentials_path.display()
    );

    let tabs = sheets_config.tabs.clone();
    let appender = SheetsAppender::new(sheets_config).context("failed to build Sheets client")?;

    let state = Arc::new(AppState {
        appender: Arc::new(appender),
        tabs,
    });

    Server::new(args.server_config(), state)
        .run()
        .await
        .context("server error")?;

    Ok(())
}
