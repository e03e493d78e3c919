use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error_chain_fmt;

/// Port assumed when an address string omits one.
pub const DEFAULT_PORT: u16 = 27017;

/// A `(hostname, port)` pair identifying one server of a deployment.
///
/// Addresses compare by value and are used as map keys throughout the crate. The hostname is
/// stored lower-cased so `A:1` and `a:1` name the same host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostAddress {
    host: String,
    port: u16,
}

impl HostAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into().to_lowercase(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Parses every string in `hosts`, failing on the first invalid one.
    pub fn parse_all<T>(hosts: &[T]) -> Result<Vec<HostAddress>, InvalidHostAddress>
    where
        T: AsRef<str>,
    {
        hosts.iter().map(|h| h.as_ref().parse()).collect()
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostAddress {
    type Err = InvalidHostAddress;

    /// Parses `host` or `host:port`.
    ///
    /// The string is validated by handing it to [`Url`] as the authority of a `mongodb://` url,
    /// which rejects empty hosts, paths, credentials and out of range ports.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidHostAddress(s.to_string());
        let trimmed = s.trim();
        if trimmed.is_empty()
            || trimmed.starts_with(':')
            || trimmed.contains(['/', '@', '?', '#'])
        {
            return Err(invalid());
        }

        let url = Url::parse(&format!("mongodb://{}", trimmed)).map_err(|_| invalid())?;
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let port = url.port().unwrap_or(DEFAULT_PORT);

        Ok(HostAddress::new(host, port))
    }
}

impl Serialize for HostAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HostAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(thiserror::Error, PartialEq, Eq, Clone)]
#[error("`{0}` is not a valid host address, expected `host` or `host:port`")]
pub struct InvalidHostAddress(pub String);

impl std::fmt::Debug for InvalidHostAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_host_and_port() {
        let address: HostAddress = "a:1".parse().unwrap();

        assert_eq!(address.host(), "a");
        assert_eq!(address.port(), 1);
        assert_eq!(address.to_string(), "a:1");
    }

    #[test]
    fn parse_uses_default_port_when_missing() {
        let address: HostAddress = "db.example.com".parse().unwrap();

        assert_eq!(address, HostAddress::new("db.example.com", DEFAULT_PORT));
    }

    #[test]
    fn parse_lowercases_the_hostname() {
        let address: HostAddress = "DB.Example.com:27018".parse().unwrap();

        assert_eq!(address.to_string(), "db.example.com:27018");
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", ":1", "a:notaport", "a:70000", "user@a:1", "a:1/path"] {
            assert!(bad.parse::<HostAddress>().is_err(), "accepted `{}`", bad);
        }
    }

    #[test]
    fn parse_all_fails_on_first_invalid_entry() {
        let result = HostAddress::parse_all(&["a:1", "b:x", "c:3"]);

        assert_eq!(result, Err(InvalidHostAddress("b:x".to_string())));
    }

    #[test]
    fn serde_uses_the_host_port_string() {
        let address = HostAddress::new("a", 1);

        let json = serde_json::to_value(&address).unwrap();
        let back: HostAddress = serde_json::from_value(json.clone()).unwrap();

        assert_eq!(json, serde_json::json!("a:1"));
        assert_eq!(back, address);
    }
}
