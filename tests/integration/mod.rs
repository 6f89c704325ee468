mod discovery_flow;
mod persistence;
mod rate_limit;
