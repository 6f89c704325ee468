use anyhow::Context;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::client::{AuthHeaderProvider, PLEX_TOKEN_HEADER};
use super::errors::DiscoveryError;
use super::parser::parse_resources;
use super::retry::{AttemptFailure, RateLimitController, Sleeper};
use super::types::PlexResource;
use crate::config::DiscoveryConfig;
use crate::models::PlexServer;
use crate::utils::redact_url;

const OPERATION: &str = "discover_servers";
const MAX_BODY_IN_ERROR: usize = 200;

/// The different ways of asking plex.tv for the same resource list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlVariant {
    /// Primary host, token in the `X-Plex-Token` header
    HeaderAuth,
    /// Primary host, token repeated in the query string
    TokenInQuery,
    /// Alternate discovery host, token in the header
    AlternateHost,
}

impl fmt::Display for UrlVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UrlVariant::HeaderAuth => "header-auth",
            UrlVariant::TokenInQuery => "token-in-query",
            UrlVariant::AlternateHost => "alternate-host",
        };
        f.write_str(label)
    }
}

/// Fetches the user's resources from plex.tv.
///
/// Within one attempt the URL variants are tried in order; only a 5xx or a
/// transport error moves on to the next variant. Retrying whole attempts
/// (429 backoff, exhausted variants) is delegated to [`RateLimitController`].
pub struct ResourceFetcher {
    client: reqwest::Client,
    auth: Arc<dyn AuthHeaderProvider>,
    base_url: String,
    alternate_url: Option<String>,
    controller: RateLimitController,
}

impl ResourceFetcher {
    pub fn new(config: &DiscoveryConfig, auth: Arc<dyn AuthHeaderProvider>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            auth,
            base_url: config.plex_tv_url.clone(),
            alternate_url: config.alternate_discovery_url.clone(),
            controller: RateLimitController::new(config.rate_limit_policy()),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.controller = self.controller.with_sleeper(sleeper);
        self
    }

    /// Discovery URLs for this attempt, in the order they are tried
    pub fn url_variants(&self) -> Vec<(UrlVariant, Url)> {
        let mut variants = Vec::with_capacity(3);

        if let Some(url) = resources_url(&self.base_url) {
            variants.push((UrlVariant::HeaderAuth, url.clone()));

            if let Some(token) = self.auth.auth_token() {
                let mut with_token = url;
                with_token
                    .query_pairs_mut()
                    .append_pair(PLEX_TOKEN_HEADER, &token);
                variants.push((UrlVariant::TokenInQuery, with_token));
            }
        } else {
            warn!("Ignoring invalid discovery URL {}", redact_url(&self.base_url));
        }

        if let Some(alternate) = self.alternate_url.as_deref() {
            match resources_url(alternate) {
                Some(url) => variants.push((UrlVariant::AlternateHost, url)),
                None => warn!("Ignoring invalid alternate discovery URL {}", redact_url(alternate)),
            }
        }

        variants
    }

    /// Raw resource list, retried per the rate-limit policy
    pub async fn fetch_resources(&self) -> Result<Vec<PlexResource>, DiscoveryError> {
        self.controller
            .execute(OPERATION, |attempt| self.attempt(attempt))
            .await
    }

    /// Server-capable resources with sanitized connections
    pub async fn fetch_servers(&self) -> Result<Vec<PlexServer>, DiscoveryError> {
        let resources = self.fetch_resources().await?;
        let total = resources.len();

        let servers: Vec<PlexServer> = resources
            .into_iter()
            .filter_map(PlexResource::into_server)
            .collect();

        info!("Found {} Plex servers among {} resources", servers.len(), total);
        Ok(servers)
    }

    async fn attempt(&self, attempt: u32) -> Result<Vec<PlexResource>, AttemptFailure> {
        let variants = self.url_variants();
        if variants.is_empty() {
            return Err(AttemptFailure::Fatal(DiscoveryError::ServerUnreachable {
                status: None,
                message: "no valid discovery URL configured".to_string(),
            }));
        }

        let headers = self.auth.auth_headers();
        let mut last_error = None;

        for (variant, url) in variants {
            let redacted = redact_url(url.as_str());
            debug!(
                "[{}] GET {} ({}, attempt {})",
                OPERATION, redacted, variant, attempt
            );

            let response = match self.client.get(url).headers(headers.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = DiscoveryError::from_reqwest(e, &redacted);
                    debug!("[{}] {} failed: {}", OPERATION, variant, err);
                    last_error = Some(err);
                    continue;
                }
            };

            let status = response.status();
            debug!("[{}] Response: {} ({})", OPERATION, status, variant);

            if status.is_success() {
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);

                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => {
                        last_error = Some(DiscoveryError::from_reqwest(e, &redacted));
                        continue;
                    }
                };

                return parse_resources(content_type.as_deref(), &body)
                    .map_err(AttemptFailure::Fatal);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                return Err(AttemptFailure::RateLimited {
                    retry_after,
                    message: format!("HTTP {} from {}", status.as_u16(), redacted),
                });
            }

            if status.is_server_error() {
                warn!(
                    "[{}] {} returned {}, trying next variant",
                    OPERATION, redacted, status
                );
                last_error = Some(DiscoveryError::ServerUnreachable {
                    status: Some(status.as_u16()),
                    message: format!("HTTP {} from {}", status.as_u16(), redacted),
                });
                continue;
            }

            // Any other status is decisive for the whole attempt
            let body = response.text().await.unwrap_or_default();
            let message = format!("{} from {}", snippet(&body), redacted);
            return Err(AttemptFailure::Fatal(DiscoveryError::from_status(
                status.as_u16(),
                message,
            )));
        }

        Err(AttemptFailure::Exhausted(last_error.unwrap_or_else(|| {
            DiscoveryError::ServerUnreachable {
                status: None,
                message: "all discovery URL variants failed".to_string(),
            }
        })))
    }
}

fn resources_url(base: &str) -> Option<Url> {
    let mut url = Url::parse(&format!("{}/resources", base.trim_end_matches('/'))).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.query_pairs_mut()
        .append_pair("includeHttps", "1")
        .append_pair("includeRelay", "1");
    Some(url)
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response".to_string();
    }
    match trimmed.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
