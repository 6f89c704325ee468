use reqwest::header::{HeaderMap, HeaderValue};
use tracing::warn;

pub const PLEX_PRODUCT: &str = "Plex Discovery";
pub const PLEX_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PLEX_CLIENT_IDENTIFIER: &str = "plex-discovery";
pub const PLEX_PLATFORM: &str = "Linux";

/// Header carrying the Plex auth token
pub const PLEX_TOKEN_HEADER: &str = "X-Plex-Token";

/// Create standard Plex headers for discovery and connection probes.
///
/// # Arguments
/// * `auth_token` - Optional authentication token. Pass None for unauthenticated requests.
pub fn create_standard_headers(auth_token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(token) = auth_token {
        match HeaderValue::from_str(token) {
            Ok(value) => {
                headers.insert(PLEX_TOKEN_HEADER, value);
            }
            Err(_) => warn!("Auth token contains characters not allowed in headers, omitting it"),
        }
    }

    headers.insert("Accept", HeaderValue::from_static("application/json"));
    headers.insert(
        "X-Plex-Client-Identifier",
        HeaderValue::from_static(PLEX_CLIENT_IDENTIFIER),
    );
    headers.insert("X-Plex-Product", HeaderValue::from_static(PLEX_PRODUCT));
    headers.insert("X-Plex-Version", HeaderValue::from_static(PLEX_VERSION));
    headers.insert("X-Plex-Platform", HeaderValue::from_static(PLEX_PLATFORM));

    headers
}

/// Supplies request headers from the sign-in layer. The token lifecycle is
/// owned by the caller; this crate only asks for headers when it needs them.
pub trait AuthHeaderProvider: Send + Sync {
    fn auth_headers(&self) -> HeaderMap;

    /// The token itself, used for the token-in-query URL variant
    fn auth_token(&self) -> Option<String> {
        self.auth_headers()
            .get(PLEX_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }
}

impl<F> AuthHeaderProvider for F
where
    F: Fn() -> HeaderMap + Send + Sync,
{
    fn auth_headers(&self) -> HeaderMap {
        self()
    }
}

/// Fixed token plus the standard client identification headers
#[derive(Clone)]
pub struct StaticTokenAuth {
    token: Option<String>,
}

impl StaticTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

impl std::fmt::Debug for StaticTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenAuth")
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl AuthHeaderProvider for StaticTokenAuth {
    fn auth_headers(&self) -> HeaderMap {
        create_standard_headers(self.token.as_deref())
    }
}
