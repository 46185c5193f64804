//! Persisted entry data, integration options, and endpoint parsing.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};

use crate::errors::Error;
use crate::snapshot::LIGHT_PANEL_SHAPE;
use crate::supervisor::BackoffPolicy;

type Result<T> = std::result::Result<T, Error>;

/// Address of a controller's REST API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceEndpoint {
    host: String,
    port: u16,
}

impl DeviceEndpoint {
    /// Port the controllers listen on unless told otherwise.
    pub const DEFAULT_PORT: u16 = 16021;

    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL of the versioned API, without a token.
    pub(crate) fn api_base(&self) -> String {
        format!("http://{}:{}/api/v1", self.host, self.port)
    }

    /// Browser URL for the device, host only.
    pub fn configuration_url(&self) -> String {
        format!("http://{}", self.host)
    }
}

impl FromStr for DeviceEndpoint {
    type Err = Error;

    /// Parse `host` or `host:port`. An empty port falls back to the default.
    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();
        let input = input
            .strip_prefix("http://")
            .unwrap_or(input)
            .trim_end_matches('/');
        if input.is_empty() {
            return Err(Error::invalid_host(s, "empty host"));
        }

        let (host, port) = match input.split_once(':') {
            Some((host, "")) => (host, Self::DEFAULT_PORT),
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::invalid_host(s, "port is not a number"))?;
                (host, port)
            }
            None => (input, Self::DEFAULT_PORT),
        };

        if host.is_empty() || host.contains(char::is_whitespace) || host.contains('/') {
            return Err(Error::invalid_host(s, "bad host name"));
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<String> for DeviceEndpoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceEndpoint> for String {
    fn from(value: DeviceEndpoint) -> Self {
        value.to_string()
    }
}

/// Data written once when pairing completes and read at every setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryData {
    pub host: DeviceEndpoint,
    pub token: String,
}

impl EntryData {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(Error::JsonLoad)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::JsonDump)
    }
}

/// Tunables for one configuration entry. Every field has a default.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct IntegrationOptions {
    /// Delay policy between event stream reconnects.
    pub backoff: BackoffPolicy,
    /// Timeout for ordinary REST calls. The event stream never times out.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub request_timeout: Duration,
    /// Event type ids requested on the stream; 4 is touch gestures.
    pub event_ids: Vec<u8>,
    /// `shapeType` value that marks a controllable light panel.
    pub light_shape_type: u32,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            request_timeout: Duration::from_secs(10),
            event_ids: vec![4],
            light_shape_type: LIGHT_PANEL_SHAPE,
        }
    }
}

impl IntegrationOptions {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(Error::JsonLoad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_default_port() {
        let ep: DeviceEndpoint = "192.168.1.23".parse().unwrap();
        assert_eq!(ep.to_string(), "192.168.1.23:16021");

        let ep: DeviceEndpoint = "192.168.1.23:".parse().unwrap();
        assert_eq!(ep.port(), DeviceEndpoint::DEFAULT_PORT);
    }

    #[test]
    fn test_endpoint_explicit_port() {
        let ep: DeviceEndpoint = " http://panels.local:8080/ ".parse().unwrap();
        assert_eq!(ep.host(), "panels.local");
        assert_eq!(ep.port(), 8080);
        assert_eq!(ep.api_base(), "http://panels.local:8080/api/v1");
        assert_eq!(ep.configuration_url(), "http://panels.local");
    }

    #[test]
    fn test_endpoint_rejects_garbage() {
        assert!("".parse::<DeviceEndpoint>().is_err());
        assert!("host:abc".parse::<DeviceEndpoint>().is_err());
        assert!(":16021".parse::<DeviceEndpoint>().is_err());
        assert!("a b".parse::<DeviceEndpoint>().is_err());
    }

    #[test]
    fn test_entry_data_round_trip() {
        let data = EntryData::from_json(r#"{"host":"10.0.0.5","token":"abc"}"#).unwrap();
        assert_eq!(data.host.to_string(), "10.0.0.5:16021");
        assert_eq!(
            data.to_json().unwrap(),
            r#"{"host":"10.0.0.5:16021","token":"abc"}"#
        );
    }

    #[test]
    fn test_options_defaults_fill_missing_fields() {
        let options = IntegrationOptions::from_json(r#"{"request_timeout": 2.5}"#).unwrap();
        assert_eq!(options.request_timeout, Duration::from_millis(2500));
        assert_eq!(options.event_ids, vec![4]);
        assert_eq!(options.light_shape_type, 9);
        assert_eq!(options.backoff, BackoffPolicy::default());
    }
}
