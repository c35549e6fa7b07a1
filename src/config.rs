//! Endpoint configuration
//!
//! The protocol never reads configuration on its own; callers load an
//! [`EndpointConfig`] and pass it in.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::DEFAULT_IO_TIMEOUT_SECS;

/// Where to connect and whom to expect on the other side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Host address to dial
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Name the responder's certificate must be valid for
    pub expected_hostname: String,

    /// Read and write deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_IO_TIMEOUT_SECS
}

/// `{"Server": {"IP": .., "Port": .., "DNSName": ..}}` as used by older deployments
#[derive(Debug, Deserialize)]
struct LegacyServer {
    #[serde(rename = "IP")]
    ip: String,
    #[serde(rename = "Port")]
    port: PortValue,
    #[serde(rename = "DNSName", default)]
    dns_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Legacy {
        #[serde(rename = "Server")]
        server: LegacyServer,
    },
    Flat(EndpointConfig),
}

impl EndpointConfig {
    /// Create a configuration with the default deadline
    pub fn new(host: impl Into<String>, port: u16, expected_hostname: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            expected_hostname: expected_hostname.into(),
            timeout_secs: DEFAULT_IO_TIMEOUT_SECS,
        }
    }

    /// Override the read/write deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Deadline applied to every blocking read and write
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `host:port` for log lines and errors
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Load from a file: JSON for `.json`, TOML otherwise
    pub fn load(path: &Path) -> ProtocolResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ProtocolError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        let is_json = path.extension().map_or(false, |ext| ext == "json");
        let parsed: ConfigFile = if is_json {
            serde_json::from_str(&content)
                .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            toml::from_str(&content)
                .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))?
        };

        let config = match parsed {
            ConfigFile::Flat(config) => config,
            ConfigFile::Legacy { server } => {
                let port = match server.port {
                    PortValue::Number(port) => port,
                    PortValue::Text(text) => text.trim().parse().map_err(|_| {
                        ProtocolError::Config(format!("invalid port {:?}", text))
                    })?,
                };
                Self::new(server.ip, port, server.dns_name)
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly work
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.host.trim().is_empty() {
            return Err(ProtocolError::Config("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(ProtocolError::Config("port must be non-zero".to_string()));
        }
        if self.expected_hostname.trim().is_empty() {
            return Err(ProtocolError::Config(
                "expected_hostname is empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ProtocolError::Config("timeout_secs must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_legacy_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{"Server": {{"IP": "127.0.0.1", "Port": "9443", "DNSName": "example.test"}}}}"#
        )
        .unwrap();

        let config = EndpointConfig::load(file.path()).unwrap();
        assert_eq!(config, EndpointConfig::new("127.0.0.1", 9443, "example.test"));
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_flat_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "host = \"10.0.0.1\"\nport = 8443\nexpected_hostname = \"example.test\"\ntimeout_secs = 3"
        )
        .unwrap();

        let config = EndpointConfig::load(file.path()).unwrap();
        assert_eq!(config.address(), "10.0.0.1:8443");
        assert_eq!(config.timeout_secs, 3);
    }

    #[test]
    fn test_invalid_port_text() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{"Server": {{"IP": "127.0.0.1", "Port": "http", "DNSName": "example.test"}}}}"#
        )
        .unwrap();

        let err = EndpointConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ProtocolError::Config(_)));
    }

    #[test]
    fn test_validate() {
        assert!(EndpointConfig::new("127.0.0.1", 1, "a").validate().is_ok());
        assert!(EndpointConfig::new("", 1, "a").validate().is_err());
        assert!(EndpointConfig::new("127.0.0.1", 0, "a").validate().is_err());
        assert!(EndpointConfig::new("127.0.0.1", 1, " ").validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = EndpointConfig::load(Path::new("/nonexistent/sample.json")).unwrap_err();
        assert!(matches!(err, ProtocolError::Config(_)));
    }
}
