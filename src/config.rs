//! Client configuration.
//!
//! [`ClientConfig`] carries the settings that shape how a connection to a
//! segment store is established, and [`NodeUri`] names the node to reach.
use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeUriError {
    #[error("expected 'host:port', got '{0}'")]
    MissingPort(String),

    #[error("invalid port in '{0}'")]
    InvalidPort(String),

    #[error("empty host in '{0}'")]
    EmptyHost(String),
}

/// Address of a segment store node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeUri {
    pub endpoint: String,
    pub port: u16,
}

impl NodeUri {
    pub fn new(endpoint: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: endpoint.into(),
            port,
        }
    }
}

impl fmt::Display for NodeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.endpoint.contains(':') {
            write!(f, "[{}]:{}", self.endpoint, self.port)
        } else {
            write!(f, "{}:{}", self.endpoint, self.port)
        }
    }
}

impl FromStr for NodeUri {
    type Err = NodeUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| NodeUriError::MissingPort(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(NodeUriError::EmptyHost(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| NodeUriError::InvalidPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// Settings applied when connecting to segment store nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Wrap segment store connections in TLS.
    pub enable_tls_to_segment_store: bool,
    /// PEM file with the certificates to trust. `None` uses the platform roots.
    pub trust_store: Option<PathBuf>,
    /// Check that the server certificate names the host that was dialed.
    ///
    /// Turning this off still verifies the certificate chain but accepts a
    /// certificate issued for any name.
    pub validate_host_name: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enable_tls_to_segment_store: false,
            trust_store: None,
            validate_host_name: true,
        }
    }
}

impl ClientConfig {
    pub fn with_tls(mut self, enabled: bool) -> Self {
        self.enable_tls_to_segment_store = enabled;
        self
    }

    pub fn with_trust_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_store = Some(path.into());
        self
    }

    pub fn with_host_name_validation(mut self, validate: bool) -> Self {
        self.validate_host_name = validate;
        self
    }
}
