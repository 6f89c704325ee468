pub mod api;

pub use api::{
    AuthHeaderProvider, DiscoveryError, ResourceFetcher, StaticTokenAuth, create_standard_headers,
};
