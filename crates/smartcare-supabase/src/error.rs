//! Error types for the hosted backend adapters

use serde::Deserialize;
use smartcare_session::{IdentityError, StoreError};
use thiserror::Error;

/// Result type for adapter calls
pub type SupabaseResult<T> = Result<T, SupabaseError>;

/// Adapter failures, before they are mapped onto the collaborator errors.
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// The backend is not configured: URL or anon key missing.
    #[error("backend not configured: missing {0}")]
    NotConfigured(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("session persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SupabaseError {
    /// Build an [`Api`](Self::Api) error from a non-success response body.
    ///
    /// Understands both auth-style (`error`/`error_description`, `msg`) and
    /// REST-style (`code`/`message`) bodies; anything else is kept verbatim.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();
        let (code, message) = match parsed {
            Some(body) => {
                let code = body.error_code.or(body.error).or_else(|| match body.code {
                    Some(serde_json::Value::String(code)) => Some(code),
                    _ => None,
                });
                let message = body
                    .error_description
                    .or(body.msg)
                    .or(body.message)
                    .or_else(|| code.clone())
                    .unwrap_or_else(|| body_or_status(status, body_text(body.details)));
                (code, message)
            }
            None => (None, body_or_status(status, body.to_string())),
        };
        SupabaseError::Api {
            status,
            code,
            message,
        }
    }

    fn api_code(&self) -> Option<&str> {
        match self {
            SupabaseError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    details: Option<String>,
}

fn body_text(details: Option<String>) -> String {
    details.unwrap_or_default()
}

fn body_or_status(status: u16, body: String) -> String {
    if body.trim().is_empty() {
        format!("status {status}")
    } else {
        body
    }
}

impl From<SupabaseError> for IdentityError {
    fn from(err: SupabaseError) -> Self {
        let code = err.api_code().map(str::to_string);
        match err {
            SupabaseError::Api {
                status, message, ..
            } if status < 500 => match code.as_deref() {
                Some("invalid_grant" | "invalid_credentials") => IdentityError::InvalidCredentials,
                Some("user_already_exists" | "email_exists") => {
                    IdentityError::AlreadyRegistered(message)
                }
                _ if message.contains("Invalid login credentials") => {
                    IdentityError::InvalidCredentials
                }
                _ if message.contains("already registered") => {
                    IdentityError::AlreadyRegistered(message)
                }
                _ => IdentityError::Rejected(message),
            },
            other => IdentityError::Unavailable(other.to_string()),
        }
    }
}

impl From<SupabaseError> for StoreError {
    fn from(err: SupabaseError) -> Self {
        let code = err.api_code().map(str::to_string);
        match err {
            SupabaseError::Api {
                status, message, ..
            } => match (status, code.as_deref()) {
                (409, _) | (_, Some("23505")) => StoreError::Conflict(message),
                (400 | 422, _) => StoreError::InvalidInput(message),
                (_, Some(code)) if code.starts_with("22") || code.starts_with("23") => {
                    StoreError::InvalidInput(message)
                }
                _ => StoreError::Backend(format!("status {status}: {message}")),
            },
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_bodies() {
        let legacy = SupabaseError::from_response(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(IdentityError::from(legacy), IdentityError::InvalidCredentials);

        let current = SupabaseError::from_response(
            422,
            r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#,
        );
        assert_eq!(
            IdentityError::from(current),
            IdentityError::AlreadyRegistered("User already registered".into())
        );

        let weak = SupabaseError::from_response(
            422,
            r#"{"code":422,"error_code":"weak_password","msg":"Password should be at least 6 characters"}"#,
        );
        assert!(matches!(IdentityError::from(weak), IdentityError::Rejected(_)));
    }

    #[test]
    fn test_server_errors_are_unavailable() {
        let err = SupabaseError::from_response(503, "");
        assert!(matches!(err, SupabaseError::Api { ref message, .. } if message == "status 503"));
        assert!(matches!(IdentityError::from(err), IdentityError::Unavailable(_)));
        assert!(matches!(
            IdentityError::from(SupabaseError::NotConfigured("url")),
            IdentityError::Unavailable(_)
        ));
    }

    #[test]
    fn test_rest_error_bodies() {
        let duplicate = SupabaseError::from_response(
            409,
            r#"{"code":"23505","details":null,"hint":null,"message":"duplicate key value violates unique constraint"}"#,
        );
        assert!(matches!(StoreError::from(duplicate), StoreError::Conflict(_)));

        let not_null = SupabaseError::from_response(
            400,
            r#"{"code":"23502","message":"null value in column \"phone\""}"#,
        );
        assert!(matches!(StoreError::from(not_null), StoreError::InvalidInput(_)));

        let rls = SupabaseError::from_response(
            403,
            r#"{"code":"42501","message":"new row violates row-level security policy"}"#,
        );
        assert!(matches!(StoreError::from(rls), StoreError::Backend(_)));
    }

    #[test]
    fn test_unparseable_body_kept_verbatim() {
        let err = SupabaseError::from_response(502, "<html>bad gateway</html>");
        assert!(matches!(err, SupabaseError::Api { ref message, code: None, .. } if message.contains("bad gateway")));
    }
}
