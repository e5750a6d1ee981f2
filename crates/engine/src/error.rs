//! Error taxonomy for calls against the maintenance backend.

use crate::types::ErrorCode;
use serde::Deserialize;
use std::collections::BTreeMap;

pub type ApiResult<T> = Result<T, ApiError>;

/// Field name → messages, as returned by the backend's validation problem
/// details.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// HTTP 400
    #[error("validation failed: {message}")]
    Validation { message: String, fields: FieldErrors },

    /// HTTP 401. The session has already been cleared when this is returned.
    #[error("not authenticated")]
    Unauthorized,

    /// HTTP 403
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// HTTP 404
    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP 409, e.g. duplicate machine or part number
    #[error("conflict: {0}")]
    Conflict(String),

    /// HTTP 5xx
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Any other non-success status
    #[error("unexpected status {status}: {message}")]
    Http { status: u16, message: String },

    /// No response object at all (DNS, refused connection, TLS ...)
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("cannot decode response: {0}")]
    Decode(String),

    /// Rejected on the client before any request was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Error body shapes the backend produces: its own `{message}` envelope and
/// ASP.NET validation problem details (`{title, errors}`).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

impl ApiError {
    /// Map a non-success status and its raw body to an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let fields = parsed.errors.as_ref().map(field_errors).unwrap_or_default();
        let message = parsed
            .message
            .or(parsed.detail)
            .or(parsed.title)
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() || trimmed.starts_with('{') {
                    format!("HTTP {}", status)
                } else {
                    trimmed.chars().take(512).collect()
                }
            });

        match status {
            400 => ApiError::Validation { message, fields },
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Http { status, message },
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status.as_u16(), "")
        } else {
            ApiError::Network(err.to_string())
        }
    }

    /// HTTP status behind this error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Validation { .. } => Some(400),
            ApiError::Unauthorized => Some(401),
            ApiError::Forbidden(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::Server { status, .. } | ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }

    /// Transient failures a read may be retried on.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout | ApiError::Server { .. } => true,
            ApiError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            ApiError::Validation { .. } => ErrorCode::ValidationFailed,
            ApiError::Unauthorized => ErrorCode::Unauthenticated,
            ApiError::Forbidden(_) => ErrorCode::PermissionDenied,
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::Conflict(_) => ErrorCode::Conflict,
            ApiError::Server { .. } => ErrorCode::ServerError,
            ApiError::Http { .. } => ErrorCode::InvalidInput,
            ApiError::Network(_) => ErrorCode::NetworkError,
            ApiError::Timeout => ErrorCode::Timeout,
            ApiError::Decode(_) => ErrorCode::InternalError,
            ApiError::InvalidInput(_) => ErrorCode::InvalidInput,
        }
    }

    /// Localized message suitable for showing to the operator.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation { message, fields } => {
                if fields.is_empty() {
                    format!("Ungültige Eingabe: {}", message)
                } else {
                    let details: Vec<String> = fields
                        .iter()
                        .map(|(field, msgs)| format!("{}: {}", field, msgs.join(", ")))
                        .collect();
                    format!("Ungültige Eingabe: {}", details.join("; "))
                }
            }
            ApiError::Unauthorized => {
                "Ihre Sitzung ist abgelaufen. Bitte melden Sie sich erneut an.".to_string()
            }
            ApiError::Forbidden(_) => {
                "Sie haben keine Berechtigung für diese Aktion.".to_string()
            }
            ApiError::NotFound(_) => "Der angeforderte Eintrag wurde nicht gefunden.".to_string(),
            ApiError::Conflict(message) => format!("Konflikt: {}", message),
            ApiError::Server { .. } => {
                "Serverfehler. Bitte versuchen Sie es später erneut.".to_string()
            }
            ApiError::Http { status, message } => {
                format!("Anfrage fehlgeschlagen ({}): {}", status, message)
            }
            ApiError::Network(_) => {
                "Keine Verbindung zum Server. Bitte überprüfen Sie Ihre Internetverbindung."
                    .to_string()
            }
            ApiError::Timeout => {
                "Zeitüberschreitung der Anfrage. Bitte versuchen Sie es erneut.".to_string()
            }
            ApiError::Decode(_) => "Unerwartete Antwort vom Server.".to_string(),
            ApiError::InvalidInput(message) => message.clone(),
        }
    }
}

fn field_errors(value: &serde_json::Value) -> FieldErrors {
    let mut out = FieldErrors::new();
    match value {
        serde_json::Value::Object(map) => {
            for (field, msgs) in map {
                let list = match msgs {
                    serde_json::Value::Array(items) => items
                        .iter()
                        .filter_map(|m| m.as_str().map(String::from))
                        .collect(),
                    serde_json::Value::String(s) => vec![s.clone()],
                    _ => Vec::new(),
                };
                if !list.is_empty() {
                    out.insert(field.clone(), list);
                }
            }
        }
        // Some endpoints answer with a bare list of messages.
        serde_json::Value::Array(items) => {
            let list: Vec<String> = items
                .iter()
                .filter_map(|m| m.as_str().map(String::from))
                .collect();
            if !list.is_empty() {
                out.insert(String::new(), list);
            }
        }
        _ => {}
    }
    out
}
