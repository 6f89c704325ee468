use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::errors::DiscoveryError;
use super::types::{PlexResource, PlexResourceConnection};

/// Turns a resources response body into raw resources
pub trait ResourceParser: Send + Sync {
    fn format(&self) -> &'static str;
    fn parse(&self, body: &str) -> Result<Vec<PlexResource>, DiscoveryError>;
}

/// Current plex.tv format: a JSON array of resources
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonResourceParser;

/// Legacy format: `<MediaContainer>` with `<Device>`/`<Connection>` children
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlResourceParser;

static JSON_PARSER: JsonResourceParser = JsonResourceParser;
static XML_PARSER: XmlResourceParser = XmlResourceParser;

/// True when the content type or the first non-blank character says XML
pub fn looks_like_xml(content_type: Option<&str>, body: &str) -> bool {
    let declared_xml = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("xml"))
        .unwrap_or(false);
    declared_xml || body.trim_start().starts_with('<')
}

/// Parsers to try, in order. JSON always comes first; XML is only a
/// candidate when the response advertises or looks like XML.
pub fn select_parsers(content_type: Option<&str>, body: &str) -> Vec<&'static dyn ResourceParser> {
    let mut parsers: Vec<&'static dyn ResourceParser> = vec![&JSON_PARSER];
    if looks_like_xml(content_type, body) {
        parsers.push(&XML_PARSER);
    }
    parsers
}

/// Parse a resources body in whichever supported format it is in
pub fn parse_resources(
    content_type: Option<&str>,
    body: &str,
) -> Result<Vec<PlexResource>, DiscoveryError> {
    let mut last_error = None;

    for parser in select_parsers(content_type, body) {
        match parser.parse(body) {
            Ok(resources) => {
                debug!(
                    "Parsed {} resources from {} response",
                    resources.len(),
                    parser.format()
                );
                return Ok(resources);
            }
            Err(e) => {
                debug!("{} parser rejected response: {}", parser.format(), e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        DiscoveryError::Parse("response is neither JSON nor XML".to_string())
    }))
}

impl ResourceParser for JsonResourceParser {
    fn format(&self) -> &'static str {
        "JSON"
    }

    fn parse(&self, body: &str) -> Result<Vec<PlexResource>, DiscoveryError> {
        let entries: Vec<serde_json::Value> = serde_json::from_str(body)
            .map_err(|e| DiscoveryError::Parse(format!("expected a JSON array: {}", e)))?;

        // One malformed device should not hide the rest
        let resources = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<PlexResource>(entry) {
                Ok(resource) => Some(resource),
                Err(e) => {
                    warn!("Skipping malformed resource entry: {}", e);
                    None
                }
            })
            .collect();

        Ok(resources)
    }
}

impl ResourceParser for XmlResourceParser {
    fn format(&self) -> &'static str {
        "XML"
    }

    fn parse(&self, body: &str) -> Result<Vec<PlexResource>, DiscoveryError> {
        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(true);

        let mut resources = Vec::new();
        let mut current: Option<PlexResource> = None;
        let mut seen_root = false;

        loop {
            let (element, self_closing) = match reader.read_event() {
                Ok(Event::Start(e)) => (e, false),
                Ok(Event::Empty(e)) => (e, true),
                Ok(Event::End(e)) => {
                    if e.name().as_ref() == b"Device"
                        && let Some(resource) = current.take()
                    {
                        resources.push(resource);
                    }
                    continue;
                }
                Ok(Event::Eof) => break,
                Ok(_) => continue,
                Err(e) => {
                    return Err(DiscoveryError::Parse(format!(
                        "invalid XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
            };

            let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();

            if !seen_root {
                if name != "MediaContainer" {
                    return Err(DiscoveryError::Parse(format!(
                        "unexpected XML root element <{}>",
                        name
                    )));
                }
                seen_root = true;
                continue;
            }

            match name.as_str() {
                "Device" => {
                    let attrs = attributes(&element)?;
                    let Some(resource) = device_from_attributes(attrs) else {
                        warn!("Skipping <Device> without clientIdentifier");
                        continue;
                    };
                    if self_closing {
                        resources.push(resource);
                    } else {
                        // An unterminated previous device still counts
                        if let Some(previous) = current.replace(resource) {
                            resources.push(previous);
                        }
                    }
                }
                "Connection" => {
                    let attrs = attributes(&element)?;
                    match (current.as_mut(), connection_from_attributes(attrs)) {
                        (Some(device), Some(connection)) => device.connections.push(connection),
                        (None, _) => debug!("Ignoring <Connection> outside of <Device>"),
                        (_, None) => warn!("Skipping <Connection> without uri"),
                    }
                }
                _ => {}
            }
        }

        if !seen_root {
            return Err(DiscoveryError::Parse(
                "XML body contains no elements".to_string(),
            ));
        }

        if let Some(resource) = current.take() {
            resources.push(resource);
        }

        Ok(resources)
    }
}

fn attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>, DiscoveryError> {
    let mut map = HashMap::new();
    for attr in element.attributes() {
        let attr =
            attr.map_err(|e| DiscoveryError::Parse(format!("invalid XML attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DiscoveryError::Parse(format!("invalid value for {}: {}", key, e)))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn flag(value: Option<&String>) -> Option<bool> {
    value.map(|v| matches!(v.trim(), "1" | "true" | "True" | "TRUE"))
}

fn device_from_attributes(mut attrs: HashMap<String, String>) -> Option<PlexResource> {
    let client_identifier = attrs
        .remove("clientIdentifier")
        .filter(|id| !id.is_empty())?;

    Some(PlexResource {
        owned: flag(attrs.get("owned")),
        name: attrs.remove("name"),
        client_identifier,
        source_title: attrs.remove("sourceTitle").filter(|s| !s.is_empty()),
        owner_id: attrs.remove("ownerId").filter(|s| !s.is_empty()),
        provides: attrs.remove("provides"),
        connections: Vec::new(),
    })
}

fn connection_from_attributes(mut attrs: HashMap<String, String>) -> Option<PlexResourceConnection> {
    let uri = attrs.remove("uri")?;

    Some(PlexResourceConnection {
        local: flag(attrs.get("local")),
        relay: flag(attrs.get("relay")),
        port: attrs.get("port").and_then(|p| p.trim().parse().ok()),
        protocol: attrs.remove("protocol"),
        address: attrs.remove("address"),
        uri,
    })
}
