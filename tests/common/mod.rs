pub mod fixtures;

use plex_discovery::Config;
use plex_discovery::config::DiscoveryConfig;

pub use fixtures::*;

pub const TEST_TOKEN: &str = "integration-token";

/// Config pointing discovery at a mock plex.tv with short timeouts
pub fn test_config(plex_tv_url: &str) -> Config {
    Config {
        discovery: DiscoveryConfig {
            plex_tv_url: format!("{}/api/v2", plex_tv_url),
            alternate_discovery_url: None,
            rate_limit_default_delay_ms: 10,
            variant_backoff_ms: 10,
            connection_timeout_secs: 2,
            request_timeout_secs: 5,
            ..DiscoveryConfig::default()
        },
        ..Config::default()
    }
}
