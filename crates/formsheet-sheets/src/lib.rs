//! Google Sheets adapter for formsheet.
//!
//! Appends rows to tabs of a single spreadsheet, authenticating as a
//! service account. The server depends on [`RowAppender`] only.

pub mod appender;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;

pub use appender::{AppendOutcome, RowAppender, SheetsAppender};
pub use config::{SheetsConfig, TabNames};
pub use credentials::{AccessToken, ServiceAccountFetcher, ServiceAccountKey, TokenCache, TokenFetcher};
pub use error::{SheetsError, SheetsResult};
