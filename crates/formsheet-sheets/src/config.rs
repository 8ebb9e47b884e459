//! Adapter Configuration
//!
//! Everything the adapter needs to locate the spreadsheet and its tabs.
//! Constructed once at startup and handed to [`crate::SheetsAppender`].

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SPREADSHEET_ID: &str = "1RXK6s4qEw_oXq_RywKnnnS8-7nUX707BFjW5nVAqZt4";
pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4";
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Tab names inside the spreadsheet, one per enquiry kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabNames {
    pub general: String,
    pub program: String,
    pub subscription: String,
}

impl Default for TabNames {
    fn default() -> Self {
        // Spelling matches the live sheet.
        Self {
            general: "General Enquires".to_string(),
            program: "Pro Bono Enquires".to_string(),
            subscription: "Email Subscriptions".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    /// Path to the service-account JSON key
    pub credentials_path: PathBuf,
    pub tabs: TabNames,
    /// Sheets API root, overridable for tests
    pub api_base: String,
    pub scope: String,
    pub request_timeout: Duration,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: DEFAULT_SPREADSHEET_ID.to_string(),
            credentials_path: PathBuf::from("credentials.json"),
            tabs: TabNames::default(),
            api_base: DEFAULT_API_BASE.to_string(),
            scope: SPREADSHEETS_SCOPE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            credentials_path: credentials_path.into(),
            ..Self::default()
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// URL of the `values:append` call for `tab`.
    ///
    /// The range covers columns A..Z so rows of any width up to 26 land
    /// after the last populated row of the tab.
    pub fn append_url(&self, tab: &str) -> String {
        let range = format!("{}!A:Z", tab);
        format!(
            "{}/spreadsheets/{}/values/{}:append",
            self.api_base.trim_end_matches('/'),
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(&range),
        )
    }
}
