pub mod client;
pub mod errors;
pub mod parser;
pub mod resources;
pub mod retry;
pub mod types;

pub use client::{AuthHeaderProvider, StaticTokenAuth, create_standard_headers};
pub use errors::DiscoveryError;
pub use parser::{JsonResourceParser, ResourceParser, XmlResourceParser, parse_resources};
pub use resources::{ResourceFetcher, UrlVariant};
pub use retry::{RateLimitController, RateLimitPolicy, Sleeper, TokioSleeper};
pub use types::{PlexResource, PlexResourceConnection};
