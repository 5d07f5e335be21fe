//! `mongodb://` connection strings
//!
//! ```text
//! mongodb://[user[:password]@]host[:port][,host[:port]...][/[database]][?key=value[&key=value...]]
//! ```
//!
//! Option keys are case-insensitive. Values are percent-decoded. The
//! password is kept only so it can be passed on; `Display` redacts it.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::errors::{ConfigError, ConfigResult};
use crate::observability::{log_event_with_fields, Event};
use crate::routing::ReadPolicy;
use crate::topology::Endpoint;

const SCHEME: &str = "mongodb://";

/// Parsed connection string
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub hosts: Vec<Endpoint>,
    pub username: Option<String>,
    password: Option<String>,
    pub default_database: Option<String>,
    pub replica_set: Option<String>,
    pub tls: Option<bool>,
    pub socket_timeout: Option<Duration>,
    pub max_idle_time: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub heartbeat_frequency: Option<Duration>,
    pub read_policy: Option<ReadPolicy>,
    /// Options the router does not interpret, lowercased key -> value
    pub unrecognized: BTreeMap<String, String>,
}

impl ConnectionString {
    pub fn parse(input: &str) -> ConfigResult<Self> {
        let input = input.trim();
        let rest = input
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid(format!("must start with '{}'", SCHEME)))?;

        let (authority_and_path, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };
        let (authority, path) = match authority_and_path.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (authority_and_path, None),
        };

        // Credentials may contain '@' only percent-encoded, so the last '@' splits
        let (credentials, host_list) = match authority.rsplit_once('@') {
            Some((c, h)) => (Some(c), h),
            None => (None, authority),
        };

        let (username, password) = match credentials {
            Some(c) => {
                let (u, p) = match c.split_once(':') {
                    Some((u, p)) => (u, Some(p)),
                    None => (c, None),
                };
                if u.is_empty() {
                    return Err(invalid("empty username"));
                }
                (Some(percent_decode(u)?), p.map(percent_decode).transpose()?)
            }
            None => (None, None),
        };

        if host_list.is_empty() {
            return Err(invalid("no hosts"));
        }
        let hosts = host_list
            .split(',')
            .map(|h| h.parse::<Endpoint>().map_err(invalid))
            .collect::<ConfigResult<Vec<_>>>()?;

        let default_database = match path {
            Some(p) if !p.is_empty() => Some(percent_decode(p)?),
            _ => None,
        };

        let mut parsed = ConnectionString {
            hosts,
            username,
            password,
            default_database,
            replica_set: None,
            tls: None,
            socket_timeout: None,
            max_idle_time: None,
            connect_timeout: None,
            heartbeat_frequency: None,
            read_policy: None,
            unrecognized: BTreeMap::new(),
        };

        if let Some(query) = query {
            parsed.apply_options(query)?;
        }
        Ok(parsed)
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    fn apply_options(&mut self, query: &str) -> ConfigResult<()> {
        let mut mode: Option<String> = None;
        let mut region_tag: Option<String> = None;

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| invalid(format!("option '{}' has no value", pair)))?;
            let key = key.to_ascii_lowercase();
            let value = percent_decode(value)?;

            match key.as_str() {
                "replicaset" => self.replica_set = Some(value),
                "ssl" | "tls" => self.tls = Some(parse_bool(&key, &value)?),
                "sockettimeoutms" => self.socket_timeout = Some(parse_millis(&key, &value)?),
                "maxidletimems" => self.max_idle_time = Some(parse_millis(&key, &value)?),
                "connecttimeoutms" => self.connect_timeout = Some(parse_millis(&key, &value)?),
                "heartbeatfrequencyms" => self.heartbeat_frequency = Some(parse_millis(&key, &value)?),
                "readpreference" => mode = Some(value),
                "readpreferencetags" => {
                    for tag in value.split(',') {
                        match tag.split_once(':') {
                            Some(("region", region)) if !region.is_empty() => {
                                region_tag = Some(region.to_string())
                            }
                            _ => return Err(invalid(format!("unsupported read preference tag '{}'", tag))),
                        }
                    }
                }
                _ => {
                    log_event_with_fields(Event::UnknownUriOption, &[("option", &key)]);
                    self.unrecognized.insert(key, value);
                }
            }
        }

        // A region tag pins reads to that region whatever the mode says
        self.read_policy = match (mode, region_tag) {
            (_, Some(region)) => Some(ReadPolicy::TaggedRegion(region)),
            (Some(mode), None) => Some(mode.parse::<ReadPolicy>().map_err(invalid)?),
            (None, None) => None,
        };
        Ok(())
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SCHEME)?;
        if let Some(user) = &self.username {
            f.write_str(&percent_encode(user))?;
            if self.password.is_some() {
                f.write_str(":****")?;
            }
            f.write_str("@")?;
        }
        let hosts: Vec<String> = self.hosts.iter().map(|h| h.to_string()).collect();
        f.write_str(&hosts.join(","))?;
        f.write_str("/")?;
        if let Some(db) = &self.default_database {
            f.write_str(&percent_encode(db))?;
        }

        let options = self.options();
        for (i, (key, value)) in options.iter().enumerate() {
            let separator = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", separator, key, value)?;
        }
        Ok(())
    }
}

impl ConnectionString {
    /// Every parsed option as `key=value`, values percent-encoded.
    fn options(&self) -> Vec<(String, String)> {
        let millis = |d: &Duration| d.as_millis().to_string();
        let mut options = Vec::new();

        if let Some(rs) = &self.replica_set {
            options.push(("replicaSet".to_string(), percent_encode(rs)));
        }
        if let Some(tls) = self.tls {
            options.push(("tls".to_string(), tls.to_string()));
        }
        for (key, value) in [
            ("socketTimeoutMS", &self.socket_timeout),
            ("maxIdleTimeMS", &self.max_idle_time),
            ("connectTimeoutMS", &self.connect_timeout),
            ("heartbeatFrequencyMS", &self.heartbeat_frequency),
        ] {
            if let Some(d) = value {
                options.push((key.to_string(), millis(d)));
            }
        }
        match &self.read_policy {
            Some(ReadPolicy::TaggedRegion(region)) => options.push((
                "readPreferenceTags".to_string(),
                format!("region:{}", percent_encode(region)),
            )),
            Some(policy) => options.push(("readPreference".to_string(), policy.to_string())),
            None => {}
        }
        for (key, value) in &self.unrecognized {
            options.push((percent_encode(key), percent_encode(value)));
        }
        options
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionString({})", self)
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::invalid("connection_string", reason)
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(format!("option '{}' expects true or false, got '{}'", key, value))),
    }
}

fn parse_millis(key: &str, value: &str) -> ConfigResult<Duration> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| invalid(format!("option '{}' expects milliseconds, got '{}'", key, value)))
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn percent_decode(input: &str) -> ConfigResult<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input
                .get(i + 1..i + 3)
                .ok_or_else(|| invalid(format!("truncated percent escape in '{}'", input)))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| invalid(format!("bad percent escape '%{}'", hex)))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| invalid(format!("percent escapes in '{}' are not UTF-8", input)))
}
