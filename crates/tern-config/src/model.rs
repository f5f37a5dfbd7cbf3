//! Typed settings model.

use serde::{Deserialize, Serialize};
use tern_core::{BootstrapNode, ProxyType, SaveOptions, seed_nodes};

/// Log level used when none is configured.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormatSetting {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormatSetting {
    /// Persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

/// User-facing network and logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Whether the engine may use direct UDP.
    pub udp_enabled: bool,
    /// Proxy kind, persisted as an integer.
    pub proxy_type: ProxyType,
    /// Proxy host.
    pub proxy_address: String,
    /// Proxy port.
    pub proxy_port: u16,
    /// Bootstrap candidates; never empty after loading.
    pub bootstrap_nodes: Vec<BootstrapNode>,
    /// Default tracing level.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormatSetting,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            udp_enabled: false,
            proxy_type: ProxyType::None,
            proxy_address: String::new(),
            proxy_port: 0,
            bootstrap_nodes: seed_nodes(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormatSetting::Pretty,
        }
    }
}

impl Settings {
    /// Engine construction options for these settings.
    #[must_use]
    pub fn save_options(&self, save_data: Option<Vec<u8>>) -> SaveOptions {
        SaveOptions {
            save_data,
            udp_enabled: self.udp_enabled,
            proxy_type: self.proxy_type,
            proxy_address: self.proxy_address.clone(),
            proxy_port: self.proxy_port,
        }
    }
}

/// On-disk representation. Proxy type is stored as its integer mapping.
#[derive(Debug, Serialize)]
pub(crate) struct SettingsDocument<'a> {
    pub(crate) udp_enabled: bool,
    pub(crate) proxy_type: i64,
    pub(crate) proxy_address: &'a str,
    pub(crate) proxy_port: u16,
    pub(crate) bootstrap_nodes: &'a [BootstrapNode],
    pub(crate) log_level: &'a str,
    pub(crate) log_format: LogFormatSetting,
}

impl<'a> From<&'a Settings> for SettingsDocument<'a> {
    fn from(settings: &'a Settings) -> Self {
        Self {
            udp_enabled: settings.udp_enabled,
            proxy_type: settings.proxy_type.as_persisted(),
            proxy_address: &settings.proxy_address,
            proxy_port: settings.proxy_port,
            bootstrap_nodes: &settings.bootstrap_nodes,
            log_level: &settings.log_level,
            log_format: settings.log_format,
        }
    }
}
