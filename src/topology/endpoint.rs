//! Replica endpoint addresses

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Port used when an address does not name one
pub const DEFAULT_PORT: u16 = 27017;

/// `host:port` address of one replica set member
///
/// Hosts are compared case-insensitively, so they are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = String;

    /// Parse `host`, `host:port` or `[v6addr]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty host".to_string());
        }

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let close = rest
                .find(']')
                .ok_or_else(|| format!("unterminated IPv6 literal in '{}'", s))?;
            let host = &rest[..close];
            match rest[close + 1..].strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if rest.len() == close + 1 => (host, None),
                None => return Err(format!("unexpected characters after IPv6 literal in '{}'", s)),
            }
        } else {
            match s.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(format!("empty host in '{}'", s));
        }

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| format!("invalid port '{}' in '{}'", p, s))?,
            None => DEFAULT_PORT,
        };

        if port == 0 {
            return Err(format!("port must be non-zero in '{}'", s));
        }

        Ok(Endpoint::new(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}
