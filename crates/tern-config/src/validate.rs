//! Lenient parsing of the settings document.
//!
//! A value that fails validation falls back to its default and logs a warning;
//! one bad field never discards the rest of the document.

use serde_json::{Map, Value};
use tern_core::{BootstrapNode, ProxyType, seed_nodes};
use tracing::warn;

use crate::model::{DEFAULT_LOG_LEVEL, LogFormatSetting, Settings};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Build [`Settings`] from a parsed document, substituting defaults for
/// missing or invalid values.
#[must_use]
pub fn settings_from_document(document: &Map<String, Value>) -> Settings {
    let defaults = Settings::default();
    Settings {
        udp_enabled: parse_bool(document, "udp_enabled", defaults.udp_enabled),
        proxy_type: parse_proxy_type(document),
        proxy_address: parse_string(document, "proxy_address", &defaults.proxy_address),
        proxy_port: parse_port(document, "proxy_port", defaults.proxy_port),
        bootstrap_nodes: parse_bootstrap_nodes(document),
        log_level: parse_log_level(document),
        log_format: parse_log_format(document),
    }
}

fn parse_bool(document: &Map<String, Value>, field: &'static str, default: bool) -> bool {
    match document.get(field) {
        None => default,
        Some(Value::Bool(value)) => *value,
        Some(other) => {
            warn!(field, value = %other, "expected boolean; using default");
            default
        }
    }
}

fn parse_string(document: &Map<String, Value>, field: &'static str, default: &str) -> String {
    match document.get(field) {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(value)) => value.trim().to_string(),
        Some(other) => {
            warn!(field, value = %other, "expected string; using default");
            default.to_string()
        }
    }
}

fn parse_proxy_type(document: &Map<String, Value>) -> ProxyType {
    let Some(value) = document.get("proxy_type") else {
        return ProxyType::None;
    };
    match value.as_i64().and_then(ProxyType::from_persisted) {
        Some(proxy_type) => proxy_type,
        None => {
            warn!(value = %value, "proxy_type out of range; falling back to none");
            ProxyType::None
        }
    }
}

fn parse_port(document: &Map<String, Value>, field: &'static str, default: u16) -> u16 {
    let Some(value) = document.get(field) else {
        return default;
    };
    match value.as_i64().and_then(|port| u16::try_from(port).ok()) {
        Some(port) => port,
        None => {
            warn!(field, value = %value, "port must be between 0 and 65535; using default");
            default
        }
    }
}

fn parse_bootstrap_nodes(document: &Map<String, Value>) -> Vec<BootstrapNode> {
    let Some(value) = document.get("bootstrap_nodes") else {
        return seed_nodes();
    };
    let Some(entries) = value.as_array() else {
        warn!("bootstrap_nodes must be an array; using seed nodes");
        return seed_nodes();
    };

    let nodes: Vec<BootstrapNode> = entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match parse_node(entry) {
            Ok(node) => Some(node),
            Err(reason) => {
                warn!(index, reason, "skipping malformed bootstrap node");
                None
            }
        })
        .collect();

    if nodes.is_empty() {
        warn!("no usable bootstrap nodes configured; using seed nodes");
        return seed_nodes();
    }
    nodes
}

fn parse_node(entry: &Value) -> Result<BootstrapNode, &'static str> {
    let object = entry.as_object().ok_or("entry must be an object")?;
    let host = object
        .get("host")
        .and_then(Value::as_str)
        .ok_or("host must be a string")?;
    let port = object
        .get("port")
        .and_then(Value::as_u64)
        .and_then(|port| u16::try_from(port).ok())
        .filter(|port| *port != 0)
        .ok_or("port must be between 1 and 65535")?;
    let key = object
        .get("public_key")
        .and_then(Value::as_str)
        .ok_or("public_key must be a string")?;
    BootstrapNode::parse(host, port, key).map_err(|error| match error {
        tern_core::BootstrapError::MalformedNode { reason, .. } => reason,
        tern_core::BootstrapError::HostUnreachable { .. } => "host unreachable",
    })
}

fn parse_log_level(document: &Map<String, Value>) -> String {
    let level = parse_string(document, "log_level", DEFAULT_LOG_LEVEL).to_ascii_lowercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        level
    } else {
        warn!(level = %level, "unknown log level; using default");
        DEFAULT_LOG_LEVEL.to_string()
    }
}

fn parse_log_format(document: &Map<String, Value>) -> LogFormatSetting {
    match document.get("log_format").and_then(Value::as_str) {
        None => LogFormatSetting::Pretty,
        Some(raw) if raw.eq_ignore_ascii_case("json") => LogFormatSetting::Json,
        Some(raw) if raw.eq_ignore_ascii_case("pretty") => LogFormatSetting::Pretty,
        Some(raw) => {
            warn!(value = raw, "unknown log format; using pretty");
            LogFormatSetting::Pretty
        }
    }
}
