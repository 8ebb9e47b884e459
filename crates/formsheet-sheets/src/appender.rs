//! Row Appender
//!
//! The one capability the intake server needs from the spreadsheet:
//! append a row of strings to a named tab.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::client::{create_http_client, SheetsClient};
use crate::config::SheetsConfig;
use crate::credentials::{AccessToken, ServiceAccountFetcher, TokenCache, TokenFetcher};
use crate::error::{SheetsError, SheetsResult};

/// What the Sheets API reported for a successful append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// A1 range the row landed in, e.g. `'General Enquires'!A12:F12`
    pub updated_range: Option<String>,
    pub updated_rows: u64,
}

/// Append-only sink for rows. Each call makes at most one attempt.
#[async_trait]
pub trait RowAppender: Send + Sync {
    async fn append_row(&self, tab: &str, values: &[String]) -> SheetsResult<AppendOutcome>;
}

/// [`RowAppender`] backed by the Google Sheets v4 `values:append` call.
pub struct SheetsAppender {
    config: SheetsConfig,
    tokens: TokenCache,
    client: SheetsClient,
}

impl SheetsAppender {
    /// Appender authenticating with the service-account key at
    /// `config.credentials_path`.
    pub fn new(config: SheetsConfig) -> SheetsResult<Self> {
        let http = create_http_client(config.request_timeout)?;
        let fetcher = ServiceAccountFetcher::new(
            config.credentials_path.clone(),
            config.scope.clone(),
            http.clone(),
        );
        Ok(Self {
            tokens: TokenCache::new(Box::new(fetcher)),
            client: SheetsClient::new(http),
            config,
        })
    }

    /// Appender with a caller-supplied token source.
    pub fn with_fetcher(config: SheetsConfig, fetcher: Box<dyn TokenFetcher>) -> SheetsResult<Self> {
        let http = create_http_client(config.request_timeout)?;
        Ok(Self {
            tokens: TokenCache::new(fetcher),
            client: SheetsClient::new(http),
            config,
        })
    }

    /// Return a write-scoped token for the spreadsheet, reusing the cached
    /// one while it is valid.
    pub async fn authenticate(&self) -> SheetsResult<AccessToken> {
        self.tokens.token().await.map_err(|e| {
            error!("Authentication with Google failed: {}", e);
            e
        })
    }
}

#[async_trait]
impl RowAppender for SheetsAppender {
    async fn append_row(&self, tab: &str, values: &[String]) -> SheetsResult<AppendOutcome> {
        let token = self.authenticate().await?;

        let url = self.config.append_url(tab);
        let body = json!({
            "majorDimension": "ROWS",
            "values": [values],
        });
        let query = [
            ("valueInputOption", "USER_ENTERED"),
            ("insertDataOption", "INSERT_ROWS"),
        ];

        debug!("Appending {} values to {}", values.len(), tab);
        let response = match self.client.post(&url, &query, &token.token, &body).await {
            Ok(response) => response,
            Err(e) => {
                if let SheetsError::Api { status: 401, .. } = e {
                    self.tokens.invalidate().await;
                }
                error!("Error appending to {}: {}", tab, e);
                return Err(e);
            }
        };

        let outcome = parse_outcome(&response);
        info!(
            "Appended {} row(s) to {} ({})",
            outcome.updated_rows,
            tab,
            outcome.updated_range.as_deref().unwrap_or("range unknown")
        );
        Ok(outcome)
    }
}

fn parse_outcome(response: &Value) -> AppendOutcome {
    let updates = response.get("updates");
    AppendOutcome {
        updated_range: updates
            .and_then(|u| u.get("updatedRange"))
            .and_then(|v| v.as_str())
            .map(String::from),
        updated_rows: updates
            .and_then(|u| u.get("updatedRows"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::{Duration, Utc};
    use std::collections::HashMap;

    #[derive(Debug, Clone)]
    struct SeenAppend {
        spreadsheet: String,
        range: String,
        query: HashMap<String, String>,
        authorization: String,
        body: Value,
    }

    /// Fake Sheets API answering every append with the given status/body.
    async fn spawn_sheets(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<SeenAppend>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let router = Router::new().route(
            "/v4/spreadsheets/:id/values/*range",
            post(
                move |Path((spreadsheet, range)): Path<(String, String)>,
                      Query(query): Query<HashMap<String, String>>,
                      headers: HeaderMap,
                      Json(body): Json<Value>| {
                    let recorded = Arc::clone(&recorded);
                    let reply = reply.clone();
                    async move {
                        recorded.lock().unwrap().push(SeenAppend {
                            spreadsheet,
                            range,
                            query,
                            authorization: headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default()
                                .to_string(),
                            body,
                        });
                        (status, Json(reply))
                    }
                },
            ),
        );
        let base = crate::test_util::spawn_server(router).await;
        (format!("{}/v4", base), seen)
    }

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenFetcher for CountingFetcher {
        async fn fetch(&self) -> SheetsResult<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AccessToken::new(format!("token-{}", n), Utc::now() + Duration::hours(1)))
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl TokenFetcher for FailingFetcher {
        async fn fetch(&self) -> SheetsResult<AccessToken> {
            Err(SheetsError::Credentials("failed to read credentials.json".into()))
        }
    }

    fn appender(api_base: &str) -> (SheetsAppender, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = SheetsConfig::new("sheet-1", "unused.json").with_api_base(api_base);
        let appender = SheetsAppender::with_fetcher(
            config,
            Box::new(CountingFetcher {
                calls: Arc::clone(&calls),
            }),
        )
        .unwrap();
        (appender, calls)
    }

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_append_row_success() {
        let (api_base, seen) = spawn_sheets(
            StatusCode::OK,
            json!({
                "spreadsheetId": "sheet-1",
                "tableRange": "'Email Subscriptions'!A1:C4",
                "updates": {
                    "spreadsheetId": "sheet-1",
                    "updatedRange": "'Email Subscriptions'!A5:C5",
                    "updatedRows": 1,
                    "updatedColumns": 3,
                    "updatedCells": 3
                }
            }),
        )
        .await;
        let (appender, _) = appender(&api_base);

        let values = row(&["2025-01-01T00:00:00.000Z", "a@example.com", "General"]);
        let outcome = appender.append_row("Email Subscriptions", &values).await.unwrap();

        assert_eq!(outcome.updated_rows, 1);
        assert_eq!(outcome.updated_range.as_deref(), Some("'Email Subscriptions'!A5:C5"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].spreadsheet, "sheet-1");
        assert_eq!(seen[0].range, "Email Subscriptions!A:Z:append");
        assert_eq!(seen[0].query["valueInputOption"], "USER_ENTERED");
        assert_eq!(seen[0].authorization, "Bearer token-1");
        assert_eq!(seen[0].body["values"], json!([values]));
    }

    #[tokio::test]
    async fn test_token_reused_across_appends() {
        let (api_base, seen) = spawn_sheets(StatusCode::OK, json!({})).await;
        let (appender, calls) = appender(&api_base);

        appender.append_row("General Enquires", &row(&["a"])).await.unwrap();
        appender.append_row("General Enquires", &row(&["b"])).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_api_error_envelope() {
        let (api_base, _) = spawn_sheets(
            StatusCode::BAD_REQUEST,
            json!({
                "error": {
                    "code": 400,
                    "message": "Unable to parse range: Missing!A:Z",
                    "status": "INVALID_ARGUMENT"
                }
            }),
        )
        .await;
        let (appender, _) = appender(&api_base);

        let err = appender.append_row("Missing", &row(&["x"])).await.unwrap_err();
        match err {
            SheetsError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("Unable to parse range"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let (api_base, _) = spawn_sheets(StatusCode::TOO_MANY_REQUESTS, json!({})).await;
        let (appender, _) = appender(&api_base);

        let err = appender.append_row("General Enquires", &row(&["x"])).await.unwrap_err();
        assert!(matches!(err, SheetsError::RateLimited));
        assert!(!err.is_auth());
    }

    #[tokio::test]
    async fn test_unauthorized_drops_cached_token() {
        let (api_base, _) = spawn_sheets(
            StatusCode::UNAUTHORIZED,
            json!({ "error": { "code": 401, "message": "Request had invalid authentication credentials." } }),
        )
        .await;
        let (appender, calls) = appender(&api_base);

        assert!(appender.append_row("General Enquires", &row(&["x"])).await.is_err());
        assert!(appender.append_row("General Enquires", &row(&["x"])).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_skips_append() {
        let (api_base, seen) = spawn_sheets(StatusCode::OK, json!({})).await;
        let config = SheetsConfig::new("sheet-1", "unused.json").with_api_base(&api_base);
        let appender = SheetsAppender::with_fetcher(config, Box::new(FailingFetcher)).unwrap();

        let err = appender.append_row("General Enquires", &row(&["x"])).await.unwrap_err();
        assert!(err.is_auth());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_file_fails_authentication() {
        let config = SheetsConfig::new("sheet-1", "/nonexistent/credentials.json");
        let appender = SheetsAppender::new(config).unwrap();

        let err = appender.authenticate().await.unwrap_err();
        assert!(matches!(err, SheetsError::Credentials(_)));
    }

    #[test]
    fn test_parse_outcome_without_updates() {
        assert_eq!(parse_outcome(&json!({})), AppendOutcome::default());
    }
}
