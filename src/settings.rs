//! Process-level settings (where things live, how to reach the panel).
//!
//! These are fixed at startup; user-facing state lives in `config.json`
//! (see [`crate::config`]).

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::display::DisplayMode;

/// Startup settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Root of `config.json`, `photos/` and `originals/` (default: `/data`)
    pub data_dir: PathBuf,

    /// Listen address (default: `0.0.0.0`)
    pub host: String,

    /// Listen port (default: 5000)
    pub port: u16,

    /// Display implementation (default: auto)
    pub display_mode: DisplayMode,

    /// Panel device node (default: `/dev/inky`)
    pub display_device: PathBuf,

    /// Font for text widgets; system fonts when unset
    pub font_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data"),
            host: "0.0.0.0".to_string(),
            port: 5000,
            display_mode: DisplayMode::Auto,
            display_device: PathBuf::from("/dev/inky"),
            font_path: None,
        }
    }
}

impl Settings {
    /// Path of the JSON config file.
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// `host:port` as a socket address string.
    ///
    /// IPv6 hosts are bracketed.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Parsed listen address, if the host is an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.bind_addr().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.config_path(), PathBuf::from("/data/config.json"));
        assert_eq!(settings.bind_addr(), "0.0.0.0:5000");
        assert_eq!(settings.display_mode, DisplayMode::Auto);
    }

    #[test]
    fn test_bind_addr_ipv6() {
        let settings = Settings {
            host: "::1".to_string(),
            port: 8080,
            ..Settings::default()
        };
        assert_eq!(settings.bind_addr(), "[::1]:8080");
        assert!(settings.socket_addr().is_some());

        let named = Settings {
            host: "localhost".to_string(),
            ..Settings::default()
        };
        assert_eq!(named.socket_addr(), None);
    }
}
