use thiserror::Error;

/// Typed error enum for server discovery against plex.tv
///
/// Each variant maps to one stable error code so callers can decide between
/// "sign in again", "try again later" and "can't reach Plex" without string
/// matching. `Clone` lets a shared in-flight discovery hand the same failure
/// to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    /// 401 from the discovery endpoint
    #[error("Authentication required: {message} (status: {status})")]
    AuthRequired { status: u16, message: String },

    /// 403 from the discovery endpoint
    #[error("Authentication invalid: {message} (status: {status})")]
    AuthInvalid { status: u16, message: String },

    /// 429 persisted across every attempt
    #[error("Rate limited after {attempts} attempts (last status: {status}): {message}")]
    RateLimited {
        status: u16,
        attempts: u32,
        message: String,
    },

    /// Network failure, timeout, or 5xx on every URL variant
    #[error("Server unreachable: {message}")]
    ServerUnreachable {
        status: Option<u16>,
        message: String,
    },

    /// Any other 4xx
    #[error("Resource not found: {message} (status: {status})")]
    ResourceNotFound { status: u16, message: String },

    /// Body was neither a JSON resource array nor an XML device list
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl DiscoveryError {
    /// Stable machine-readable code. Parse failures report as unreachable.
    pub fn code(&self) -> &'static str {
        match self {
            DiscoveryError::AuthRequired { .. } => "AUTH_REQUIRED",
            DiscoveryError::AuthInvalid { .. } => "AUTH_INVALID",
            DiscoveryError::RateLimited { .. } => "RATE_LIMITED",
            DiscoveryError::ServerUnreachable { .. } | DiscoveryError::Parse(_) => {
                "SERVER_UNREACHABLE"
            }
            DiscoveryError::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
        }
    }

    /// Whether a later, caller-initiated retry could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DiscoveryError::RateLimited { .. } | DiscoveryError::ServerUnreachable { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            DiscoveryError::AuthRequired { .. } | DiscoveryError::AuthInvalid { .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DiscoveryError::AuthRequired { status, .. }
            | DiscoveryError::AuthInvalid { status, .. }
            | DiscoveryError::RateLimited { status, .. }
            | DiscoveryError::ResourceNotFound { status, .. } => Some(*status),
            DiscoveryError::ServerUnreachable { status, .. } => *status,
            DiscoveryError::Parse(_) => None,
        }
    }

    /// Create an error from a reqwest transport error. `url` must already be redacted.
    pub fn from_reqwest(error: reqwest::Error, url: &str) -> Self {
        let message = if error.is_timeout() {
            format!("Request to {} timed out", url)
        } else if error.is_connect() {
            format!("Connection to {} failed: {}", url, error.without_url())
        } else {
            format!("Request to {} failed: {}", url, error.without_url())
        };
        DiscoveryError::ServerUnreachable {
            status: None,
            message,
        }
    }

    /// Create an error from an HTTP status code and response body
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => DiscoveryError::AuthRequired {
                status,
                message: body,
            },
            403 => DiscoveryError::AuthInvalid {
                status,
                message: body,
            },
            429 => DiscoveryError::RateLimited {
                status,
                attempts: 1,
                message: body,
            },
            400..=499 => DiscoveryError::ResourceNotFound {
                status,
                message: body,
            },
            _ => DiscoveryError::ServerUnreachable {
                status: Some(status),
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }
}
