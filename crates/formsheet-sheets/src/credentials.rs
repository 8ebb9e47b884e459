//! Service-Account Credentials
//!
//! Exchanges a signed JWT assertion for a short-lived access token
//! (OAuth 2.0 JWT bearer grant) and caches the token until it is close to
//! expiry.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use ring::signature::RsaKeyPair;
use serde::{Deserialize, Serialize};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::error::{SheetsError, SheetsResult};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Refresh when the cached token has less than this many seconds left.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Google service-account key file (the JSON downloaded from Cloud Console).
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    private_key_id: String,
    private_key: String,
    client_email: String,
    token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[REDACTED]")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

impl ServiceAccountKey {
    pub fn from_json(input: &str) -> SheetsResult<Self> {
        serde_json::from_str(input)
            .map_err(|e| SheetsError::credentials(format!("invalid service account key: {}", e)))
    }

    pub async fn from_file(path: &Path) -> SheetsResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SheetsError::credentials(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    fn key_pair(&self) -> SheetsResult<RsaKeyPair> {
        let mut reader = std::io::Cursor::new(self.private_key.as_bytes());
        let item = rustls_pemfile::read_one(&mut reader)
            .map_err(|e| SheetsError::credentials(format!("invalid PEM private key: {}", e)))?;

        match item {
            Some(rustls_pemfile::Item::Pkcs8Key(der)) => RsaKeyPair::from_pkcs8(der.secret_pkcs8_der())
                .map_err(|e| SheetsError::credentials(format!("rejected pkcs8 key: {}", e))),
            Some(rustls_pemfile::Item::Pkcs1Key(der)) => RsaKeyPair::from_der(der.secret_pkcs1_der())
                .map_err(|e| SheetsError::credentials(format!("rejected pkcs1 key: {}", e))),
            _ => Err(SheetsError::credentials("no RSA private key in key file")),
        }
    }

    /// Build an RS256-signed assertion valid for one hour from `now`.
    pub fn signed_assertion(&self, scope: &str, now: DateTime<Utc>) -> SheetsResult<String> {
        let header = JwtHeader {
            alg: "RS256",
            typ: "JWT",
            kid: Some(self.private_key_id.as_str()).filter(|id| !id.is_empty()),
        };
        let claims = JwtClaims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };

        let header_json = serde_json::to_vec(&header)
            .map_err(|e| SheetsError::credentials(format!("failed to encode jwt header: {}", e)))?;
        let claims_json = serde_json::to_vec(&claims)
            .map_err(|e| SheetsError::credentials(format!("failed to encode jwt claims: {}", e)))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );

        let key_pair = self.key_pair()?;
        let mut signature = vec![0; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &ring::signature::RSA_PKCS1_SHA256,
                &ring::rand::SystemRandom::new(),
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|_| SheetsError::credentials("failed to sign jwt assertion"))?;

        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(&signature)))
    }
}

/// Bearer token with its absolute expiry.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// True if the token is expired or expires within `margin_secs`.
    pub fn is_expiring(&self, margin_secs: i64) -> bool {
        Utc::now() + Duration::seconds(margin_secs) >= self.expires_at
    }
}

/// Source of fresh access tokens.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> SheetsResult<AccessToken>;
}

/// Fetches tokens for a service account. The key file is read on first use
/// and kept for the life of the fetcher.
pub struct ServiceAccountFetcher {
    key_path: PathBuf,
    key: OnceCell<ServiceAccountKey>,
    scope: String,
    client: Client,
}

impl ServiceAccountFetcher {
    pub fn new(key_path: impl Into<PathBuf>, scope: impl Into<String>, client: Client) -> Self {
        Self {
            key_path: key_path.into(),
            key: OnceCell::new(),
            scope: scope.into(),
            client,
        }
    }

    /// Use an already loaded key instead of reading one from disk.
    pub fn with_key(key: ServiceAccountKey, scope: impl Into<String>, client: Client) -> Self {
        Self {
            key_path: PathBuf::new(),
            key: OnceCell::new_with(Some(key)),
            scope: scope.into(),
            client,
        }
    }

    async fn key(&self) -> SheetsResult<&ServiceAccountKey> {
        self.key
            .get_or_try_init(|| async {
                let key = ServiceAccountKey::from_file(&self.key_path).await?;
                info!(
                    "Loaded service account {} from {}",
                    key.client_email,
                    self.key_path.display()
                );
                Ok::<_, SheetsError>(key)
            })
            .await
    }
}

#[async_trait]
impl TokenFetcher for ServiceAccountFetcher {
    async fn fetch(&self) -> SheetsResult<AccessToken> {
        let key = self.key().await?;
        let assertion = key.signed_assertion(&self.scope, Utc::now())?;

        debug!("Exchanging assertion at {}", key.token_uri);
        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SheetsError::TokenExchange(describe_token_error(&body, status)));
        }

        parse_token_response(&body)
    }
}

/// Summarise a token endpoint error body (`{"error": ..., "error_description": ...}`).
fn describe_token_error(body: &str, status: reqwest::StatusCode) -> String {
    let parsed: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    match parsed.get("error").and_then(|v| v.as_str()) {
        Some(err) => {
            let desc = parsed
                .get("error_description")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error");
            format!("{}: {}", err, desc)
        }
        None => format!("HTTP {} from token endpoint", status),
    }
}

fn parse_token_response(body: &str) -> SheetsResult<AccessToken> {
    let parsed: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SheetsError::Decode(format!("invalid token response: {}", e)))?;

    if parsed.get("error").is_some() {
        return Err(SheetsError::TokenExchange(describe_token_error(
            body,
            reqwest::StatusCode::OK,
        )));
    }

    let token = parsed
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SheetsError::Decode("missing access_token in token response".into()))?;

    let expires_in = parsed
        .get("expires_in")
        .and_then(|v| v.as_i64())
        .unwrap_or(3600);

    Ok(AccessToken::new(token, Utc::now() + Duration::seconds(expires_in)))
}

/// Cached access token, refreshed lazily when it nears expiry.
pub struct TokenCache {
    fetcher: Box<dyn TokenFetcher>,
    cached: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(fetcher: Box<dyn TokenFetcher>) -> Self {
        Self {
            fetcher,
            cached: RwLock::new(None),
        }
    }

    pub async fn token(&self) -> SheetsResult<AccessToken> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expiring(REFRESH_MARGIN_SECS) {
                    return Ok(token.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Another request may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref() {
            if !token.is_expiring(REFRESH_MARGIN_SECS) {
                return Ok(token.clone());
            }
        }

        match self.fetcher.fetch().await {
            Ok(token) => {
                debug!("Access token refreshed, expires at {}", token.expires_at);
                *cached = Some(token.clone());
                Ok(token)
            }
            Err(e) => match cached.as_ref() {
                Some(token) if !token.is_expiring(0) => {
                    warn!("Token refresh failed but token not yet expired: {}", e);
                    Ok(token.clone())
                }
                _ => Err(e),
            },
        }
    }

    /// Forget the cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }
}
