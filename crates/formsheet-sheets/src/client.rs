//! Sheets API HTTP Client
//!
//! Thin reqwest wrapper that attaches the bearer token and turns Google's
//! REST error conventions into [`SheetsError`] values.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{SheetsError, SheetsResult};

/// Create a reqwest client with the given overall timeout and a 10 second
/// connect timeout.
pub fn create_http_client(timeout: Duration) -> SheetsResult<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(SheetsError::Transport)
}

pub struct SheetsClient {
    client: Client,
}

impl SheetsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Authenticated POST with JSON body
    pub async fn post(
        &self,
        url: &str,
        query: &[(&str, &str)],
        access_token: &str,
        body: &Value,
    ) -> SheetsResult<Value> {
        let builder = self
            .client
            .post(url)
            .query(query)
            .bearer_auth(access_token)
            .json(body);

        self.execute_request(builder).await
    }

    async fn execute_request(&self, builder: RequestBuilder) -> SheetsResult<Value> {
        debug!("Executing Sheets API request");

        let response = builder.send().await?;
        let status = response.status();
        debug!("Response status: {}", status);

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited by Google API");
            return Err(SheetsError::RateLimited);
        }

        let body = response.text().await?;

        if status.is_success() && body.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        let parsed: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) if !status.is_success() => {
                error!("Google API error {} with non-JSON body", status);
                return Err(SheetsError::Api {
                    status: status.as_u16(),
                    message: format!("HTTP {} error", status),
                });
            }
            Err(e) => {
                return Err(SheetsError::Decode(format!("{} (body: {})", e, body)));
            }
        };

        if !status.is_success() {
            let err = extract_error(&parsed, status);
            error!("{}", err);
            return Err(err);
        }

        Ok(parsed)
    }
}

/// Build an error from Google's envelope:
///
/// ```text
/// { "error": { "code": 400, "message": "...", "status": "INVALID_ARGUMENT" } }
/// ```
fn extract_error(response: &Value, status: StatusCode) -> SheetsError {
    if let Some(error_obj) = response.get("error") {
        if let Some(message) = error_obj.get("message").and_then(|v| v.as_str()) {
            let code = error_obj
                .get("code")
                .and_then(|v| v.as_u64())
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(status.as_u16());

            return SheetsError::Api {
                status: code,
                message: message.to_string(),
            };
        }
    }

    SheetsError::Api {
        status: status.as_u16(),
        message: format!("HTTP {} error", status),
    }
}
