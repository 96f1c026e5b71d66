use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Code carried by allow-list rejections
pub const CODE_SECURITY_VIOLATION: &str = "SECURITY_VIOLATION";
/// Code carried by failures where no HTTP response was received
pub const CODE_NETWORK_ERROR: &str = "NETWORK_ERROR";
/// Code carried by 2xx responses whose body could not be decoded
pub const CODE_INVALID_RESPONSE: &str = "INVALID_RESPONSE";

const MSG_SECURITY_VIOLATION: &str = "This request was blocked by the security policy.";
const MSG_CONNECTION_REFUSED: &str =
    "Unable to connect to the server. Please check your internet connection.";
const MSG_INTERRUPTED: &str = "The network connection was interrupted. Please try again.";
const MSG_TIMEOUT: &str = "The server took too long to respond. Please try again.";
const MSG_CANCELLED: &str = "The request was cancelled.";
const MSG_UNKNOWN: &str = "Could not reach the server.";

/// Longest error text kept from a response body
const MAX_BODY_SNIPPET: usize = 400;

/// Errors produced by the gateway client.
///
/// Every variant maps onto the stable [`ClassifiedError`] shape: either a real
/// HTTP status is present, or the code is [`CODE_NETWORK_ERROR`].
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The target URL is not on the allow-list; no request was sent
    #[error("request blocked by host allow-list: {url}")]
    SecurityViolation {
        /// The rejected URL
        url: String,
    },

    /// No HTTP response was received
    #[error("network error ({failure:?}): {message}")]
    Network {
        /// What went wrong at the transport level
        failure: NetworkFailure,
        /// User-facing message for the failure
        message: String,
    },

    /// The gateway answered with a non-success status
    #[error("API error {}: {}", .0.status, .0.message)]
    Api(ApiErrorObject),
}

/// Transport-level failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailure {
    /// Connection refused or host unreachable
    ConnectionRefused,
    /// Connection dropped while sending or receiving
    Interrupted,
    /// Transport-level timeout
    Timeout,
    /// Cancelled by the caller
    Cancelled,
    /// Unrecognized transport failure
    Unknown,
}

impl NetworkFailure {
    /// Default user-facing message for this failure kind
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConnectionRefused => MSG_CONNECTION_REFUSED,
            Self::Interrupted => MSG_INTERRUPTED,
            Self::Timeout => MSG_TIMEOUT,
            Self::Cancelled => MSG_CANCELLED,
            Self::Unknown => MSG_UNKNOWN,
        }
    }

    /// Maps a reqwest transport error onto a failure kind
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::ConnectionRefused
        } else if err.is_request() || err.is_body() || err.is_decode() {
            Self::Interrupted
        } else {
            Self::Unknown
        }
    }
}

/// Error returned by the gateway for a non-success HTTP response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiErrorObject {
    /// HTTP status code
    pub status: u16,
    /// Human-readable message, preferring the server's own wording
    pub message: String,
    /// Machine-readable code supplied by the server
    pub code: Option<String>,
    /// The full parsed error body, when it was JSON
    pub details: Option<Value>,
}

/// Broad failure category callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Allow-list rejection; indicates a defect and is never retried
    SecurityViolation,
    /// No response received; the caller may retry manually
    Network,
    /// Any non-2xx response
    Http,
}

/// Serializable snapshot of a [`GatewayError`] for UI layers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    http_status: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl ClassifiedError {
    /// HTTP status, `0` when no response was received
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.http_status
    }

    /// Human-readable message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Diagnostic payload
    #[must_use]
    pub const fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }
}

impl GatewayError {
    pub(crate) fn security_violation(url: impl Into<String>) -> Self {
        Self::SecurityViolation { url: url.into() }
    }

    pub(crate) fn network(failure: NetworkFailure) -> Self {
        Self::Network {
            failure,
            message: failure.message().to_string(),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self::network(NetworkFailure::Cancelled)
    }

    /// HTTP status of the failure, `0` for network errors
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::SecurityViolation { .. } => 403,
            Self::Network { .. } => 0,
            Self::Api(obj) => obj.status,
        }
    }

    /// Human-readable message
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::SecurityViolation { .. } => MSG_SECURITY_VIOLATION,
            Self::Network { message, .. } => message,
            Self::Api(obj) => &obj.message,
        }
    }

    /// Stable machine-readable code, if any
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::SecurityViolation { .. } => Some(CODE_SECURITY_VIOLATION),
            Self::Network { .. } => Some(CODE_NETWORK_ERROR),
            Self::Api(obj) => obj.code.as_deref(),
        }
    }

    /// Diagnostic payload, if any
    #[must_use]
    pub const fn details(&self) -> Option<&Value> {
        match self {
            Self::Api(obj) => obj.details.as_ref(),
            Self::SecurityViolation { .. } | Self::Network { .. } => None,
        }
    }

    /// Broad category of this failure
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::SecurityViolation { .. } => ErrorCategory::SecurityViolation,
            Self::Network { .. } => ErrorCategory::Network,
            Self::Api(_) => ErrorCategory::Http,
        }
    }

    /// Returns `true` for allow-list rejections
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(self, Self::SecurityViolation { .. })
    }

    /// Returns `true` when no HTTP response was received
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Returns `true` when the caller cancelled the request
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Network {
                failure: NetworkFailure::Cancelled,
                ..
            }
        )
    }

    /// Whether a caller-driven retry could plausibly succeed.
    ///
    /// Only uncancelled network failures qualify. The client itself never
    /// retries them.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { failure, .. } if !matches!(failure, NetworkFailure::Cancelled))
    }

    /// A 401 response: the session may have expired
    pub(crate) const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Api(obj) if obj.status == 401)
    }

    /// Produces the serializable classified form of this error
    #[must_use]
    pub fn classified(&self) -> ClassifiedError {
        ClassifiedError {
            http_status: self.http_status(),
            message: self.message().to_string(),
            code: self.code().map(str::to_string),
            details: self.details().cloned(),
        }
    }
}

impl From<&GatewayError> for ClassifiedError {
    fn from(err: &GatewayError) -> Self {
        err.classified()
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(NetworkFailure::from_reqwest(&err))
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(MAX_BODY_SNIPPET).collect()
}

fn default_message(status: StatusCode) -> String {
    format!("Request failed with status {}", status.as_u16())
}

/// Classifies a non-success response body.
///
/// JSON bodies contribute `message` (falling back to `error`), `code`, and the
/// whole document as `details`. Anything else is treated as plain text. This
/// never fails.
#[must_use]
pub fn classify_response(status: StatusCode, body: &[u8]) -> GatewayError {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();

    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        let field = |name: &str| {
            parsed
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let message = field("message")
            .or_else(|| field("error"))
            .or_else(|| parsed.as_str().map(snippet).filter(|s| !s.is_empty()))
            .unwrap_or_else(|| default_message(status));

        let code = parsed.get("code").and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        return GatewayError::Api(ApiErrorObject {
            status: status.as_u16(),
            message,
            code,
            details: Some(parsed),
        });
    }

    let message = if trimmed.is_empty() {
        default_message(status)
    } else {
        snippet(trimmed)
    };

    GatewayError::Api(ApiErrorObject {
        status: status.as_u16(),
        message,
        code: None,
        details: None,
    })
}

/// Maps an undecodable success body to an error with context
#[must_use]
pub fn map_deser(e: &serde_json::Error, status: StatusCode, body: &[u8]) -> GatewayError {
    let body = String::from_utf8_lossy(body);
    GatewayError::Api(ApiErrorObject {
        status: status.as_u16(),
        message: format!("{e}: {}", snippet(&body)),
        code: Some(CODE_INVALID_RESPONSE.to_string()),
        details: None,
    })
}
