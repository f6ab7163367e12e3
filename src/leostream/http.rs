//! HTTP utilities for Leostream REST API calls

use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::error::RemoteError;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Non-success HTTP status, kept as a typed error so callers can downcast
#[derive(Debug, thiserror::Error)]
#[error("API request failed: {status}")]
pub struct StatusError {
    pub status: StatusCode,
}

/// Status code of a failed request, if the failure was an HTTP status.
///
/// Looks through engine errors too: a transparent remote cause hides the
/// status from the plain source chain.
pub fn status_of(error: &anyhow::Error) -> Option<StatusCode> {
    error.chain().find_map(|e| {
        if let Some(status) = e.downcast_ref::<StatusError>() {
            return Some(status.status);
        }
        match e.downcast_ref::<RemoteError>()? {
            RemoteError::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            RemoteError::Other(inner) => status_of(inner),
        }
    })
}

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for Leostream API calls
#[derive(Clone, Debug)]
pub struct LeostreamHttpClient {
    client: Client,
}

impl LeostreamHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("leosync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Send a request; `sid` goes into the Authorization header when given
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        sid: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url);
        if let Some(sid) = sid {
            request = request.header(reqwest::header::AUTHORIZATION, sid);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Only the sanitized, truncated body is logged
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(StatusError { status }.into());
        }

        if response_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_body).context("Failed to parse response JSON")
    }
}

/// Format a Leostream API error for display
/// Maps status codes to short messages instead of echoing raw API output
pub fn format_api_error(error: &anyhow::Error) -> String {
    if let Some(status) = status_of(error) {
        let message = match status.as_u16() {
            400 => "Invalid request. Check the document against `leosync <kind> schema`.",
            401 => "Authentication failed. Check the Leostream username and password.",
            403 => "Permission denied. The API user lacks the required Leostream role.",
            404 => "Resource not found.",
            409 => "Resource conflict. The object may already exist or be in use.",
            429 => "Rate limit exceeded. Please try again later.",
            500..=599 => "Leostream broker temporarily unavailable. Please try again.",
            _ => "Request failed.",
        };
        return message.to_string();
    }

    let error_str = format!("{:#}", error);
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(160)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let logged = sanitize_for_log(&body);
        assert!(logged.starts_with(&"x".repeat(200)));
        assert!(logged.contains("500 bytes total"));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("bad\r\ninput\t!"), "badinput!");
    }

    #[test]
    fn test_status_is_recoverable_through_anyhow() {
        let err: anyhow::Error = StatusError {
            status: StatusCode::NOT_FOUND,
        }
        .into();
        let err = err.context("GET gateway 7");
        assert_eq!(format_api_error(&err), "Resource not found.");
    }

    #[test]
    fn test_status_is_recoverable_through_engine_error() {
        use crate::error::{Error, Operation};

        let cause: anyhow::Error = StatusError {
            status: StatusCode::SERVICE_UNAVAILABLE,
        }
        .into();
        let err: anyhow::Error = Error::Remote {
            kind: "pool".to_string(),
            operation: Operation::Create,
            source: RemoteError::Other(cause),
        }
        .into();
        assert_eq!(status_of(&err), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(
            format_api_error(&err),
            "Leostream broker temporarily unavailable. Please try again."
        );

        let err: anyhow::Error = Error::Remote {
            kind: "gateway".to_string(),
            operation: Operation::Update,
            source: RemoteError::NotFound { id: "7".to_string() },
        }
        .into();
        assert_eq!(format_api_error(&err), "Resource not found.");
    }
}
