use serde_json::{Value, json};

/// One plex.tv resource entry advertising `provides`
pub fn resource(id: &str, name: &str, provides: &str, connections: Vec<Value>) -> Value {
    json!({
        "name": name,
        "clientIdentifier": id,
        "sourceTitle": "someone",
        "ownerId": 4242,
        "owned": false,
        "provides": provides,
        "connections": connections,
    })
}

pub fn connection(uri: &str, local: bool, relay: bool) -> Value {
    let parsed = url::Url::parse(uri).ok();
    json!({
        "protocol": parsed.as_ref().map(|u| u.scheme().to_string()),
        "address": parsed.as_ref().and_then(|u| u.host_str().map(str::to_string)),
        "port": parsed.as_ref().and_then(|u| u.port_or_known_default()),
        "uri": uri,
        "local": local,
        "relay": relay,
    })
}

pub fn resources_body(resources: Vec<Value>) -> String {
    Value::Array(resources).to_string()
}
