//! Enquiry Handlers
//!
//! One handler per form. Each validates the body, appends the resulting row
//! and reports `{successMessage}` or `{error}`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequest, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use formsheet_sheets::SheetsError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::map::Entry;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::enquiry::{
    timestamp, EnquiryKind, EnquiryRecord, GeneralEnquiry, MissingFields, ProgramEnquiry,
    Subscription,
};
use crate::server::AppState;

pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again later.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessBody {
    pub success_message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(MissingFields),

    #[error("{kind:?} submission failed: {source}")]
    Storage {
        kind: EnquiryKind,
        #[source]
        source: SheetsError,
    },
}

impl From<MissingFields> for ApiError {
    fn from(missing: MissingFields) -> Self {
        Self::Validation(missing)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(MissingFields(message)) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message })).into_response()
            }
            Self::Storage { kind, source } => {
                error!(
                    kind = kind.label(),
                    auth = source.is_auth(),
                    "{} error: {}",
                    kind.label(),
                    source
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        error: GENERIC_FAILURE,
                    }),
                )
                    .into_response()
            }
        }
    }
}

/// Request body accepted as JSON or as a URL-encoded form. Repeated form
/// keys and `key[]` keys collect into a list. A body that cannot be decoded
/// yields the empty payload, so validation rejects it.
pub struct Submission<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Submission<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = std::convert::Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        let fields = if is_form {
            Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map(|Form(pairs)| group_form_pairs(pairs))
                .map_err(|e| e.body_text())
        } else {
            Json::<Value>::from_request(req, state)
                .await
                .map(|Json(value)| value)
                .map_err(|e| e.body_text())
        };

        let payload = fields
            .and_then(|value| serde_json::from_value(value).map_err(|e| e.to_string()));

        Ok(Submission(payload.unwrap_or_else(|e| {
            warn!("Unreadable request body: {}", e);
            T::default()
        })))
    }
}

/// Fold decoded form pairs into a JSON object. A key seen more than once, or
/// written as `key[]`, becomes an array of its values in order.
fn group_form_pairs(pairs: Vec<(String, String)>) -> Value {
    let mut fields = Map::new();

    for (key, value) in pairs {
        let (key, listed) = match key.strip_suffix("[]") {
            Some(stripped) => (stripped.to_string(), true),
            None => (key, false),
        };
        let value = Value::String(value);

        match fields.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(if listed { Value::Array(vec![value]) } else { value });
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(items) => items.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }

    Value::Object(fields)
}

pub async fn general_enquiry(
    State(state): State<Arc<AppState>>,
    Submission(payload): Submission<GeneralEnquiry>,
) -> Result<Json<SuccessBody>, ApiError> {
    let record = payload.validate(timestamp())?;
    submit(&state, record).await
}

pub async fn program_enquiry(
    State(state): State<Arc<AppState>>,
    Submission(payload): Submission<ProgramEnquiry>,
) -> Result<Json<SuccessBody>, ApiError> {
    let record = payload.validate(timestamp())?;
    submit(&state, record).await
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Submission(payload): Submission<Subscription>,
) -> Result<Json<SuccessBody>, ApiError> {
    let record = payload.validate(timestamp())?;
    submit(&state, record).await
}

async fn submit(state: &AppState, record: EnquiryRecord) -> Result<Json<SuccessBody>, ApiError> {
    let kind = record.kind();
    let tab = record.tab(&state.tabs).to_string();

    state
        .appender
        .append_row(&tab, &record.into_row())
        .await
        .map_err(|source| ApiError::Storage { kind, source })?;

    info!("{} recorded in {}", kind.label(), tab);
    Ok(Json(SuccessBody {
        success_message: kind.success_message(),
    }))
}
