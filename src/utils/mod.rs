pub mod uri;

pub use uri::{REDACTION_MARKER, normalize_connection_uri, redact_url};
