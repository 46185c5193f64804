//! Pairing flow: from a host (typed in or discovered) to stored
//! [`EntryData`].
//!
//! ```text
//! user --host ok--> link --token + snapshot--> create entry
//!   ^                 |
//!   +--bad host       +--failure: show link again with base error
//! discovery --------> link
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use url::Url;

use crate::client::DeviceClient;
use crate::config::{DeviceEndpoint, EntryData, IntegrationOptions};
use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Vendor discovery property carrying the device's display name.
pub const DISCOVERY_NAME_KEY: &str = "nl-devicename";
/// Vendor discovery property carrying the device's hardware id.
pub const DISCOVERY_ID_KEY: &str = "nl-deviceid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FlowStep {
    User,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AbortReason {
    AlreadyConfigured,
    InvalidDiscoveryInfo,
}

/// What the host should do after a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    ShowForm {
        step_id: FlowStep,
        errors: BTreeMap<String, String>,
    },
    CreateEntry {
        title: String,
        unique_id: String,
        data: EntryData,
    },
    Abort {
        reason: AbortReason,
    },
}

impl FlowResult {
    fn form(step_id: FlowStep) -> Self {
        FlowResult::ShowForm {
            step_id,
            errors: BTreeMap::new(),
        }
    }

    fn form_with_error(step_id: FlowStep, error: &str) -> Self {
        FlowResult::ShowForm {
            step_id,
            errors: BTreeMap::from([("base".to_string(), error.to_string())]),
        }
    }
}

/// An SSDP or zeroconf announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    /// `http://host:port` URL, or a bare `host[:port]`.
    pub location: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl DiscoveryRecord {
    pub fn device_name(&self) -> Option<&str> {
        self.properties.get(DISCOVERY_NAME_KEY).map(String::as_str)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.properties.get(DISCOVERY_ID_KEY).map(String::as_str)
    }

    pub fn endpoint(&self) -> Result<DeviceEndpoint> {
        let location = self.location.trim();
        if !location.contains("://") {
            return location.parse();
        }
        let url = Url::parse(location)
            .map_err(|e| Error::invalid_host(location, &e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::invalid_host(location, "no host in location"))?;
        Ok(DeviceEndpoint::new(
            host,
            url.port().unwrap_or(DeviceEndpoint::DEFAULT_PORT),
        ))
    }
}

/// One pairing attempt.
///
/// `configured` holds the unique ids (serial numbers) of entries that
/// already exist, so the same device is never added twice.
#[derive(Debug)]
pub struct ConfigFlow {
    options: IntegrationOptions,
    configured: HashSet<String>,
    client: Option<Arc<DeviceClient>>,
    discovered_name: Option<String>,
}

impl ConfigFlow {
    pub fn new(configured: HashSet<String>) -> Self {
        Self::with_options(configured, IntegrationOptions::default())
    }

    pub fn with_options(configured: HashSet<String>, options: IntegrationOptions) -> Self {
        ConfigFlow {
            options,
            configured,
            client: None,
            discovered_name: None,
        }
    }

    /// Endpoint chosen so far, if any.
    pub fn endpoint(&self) -> Option<&DeviceEndpoint> {
        self.client.as_deref().map(DeviceClient::endpoint)
    }

    /// Name announced by discovery, shown to the user on the link form.
    pub fn discovered_name(&self) -> Option<&str> {
        self.discovered_name.as_deref()
    }

    /// Ask for, then check, a host.
    pub fn step_user(&mut self, host: Option<&str>) -> FlowResult {
        let Some(host) = host else {
            return FlowResult::form(FlowStep::User);
        };
        match host.parse::<DeviceEndpoint>() {
            Ok(endpoint) => {
                self.use_endpoint(endpoint);
                FlowResult::form(FlowStep::Link)
            }
            Err(e) => {
                warn!("rejecting host {host:?}: {e}");
                FlowResult::form(FlowStep::User)
            }
        }
    }

    /// Start from a discovery record instead of a typed host.
    pub fn step_discovery(&mut self, record: &DiscoveryRecord) -> FlowResult {
        let endpoint = match record.endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("ignoring discovery record {:?}: {e}", record.location);
                return FlowResult::Abort {
                    reason: AbortReason::InvalidDiscoveryInfo,
                };
            }
        };
        info!(
            "discovered {} ({}) at {endpoint}",
            record.device_name().unwrap_or("unnamed device"),
            record.device_id().unwrap_or("no id"),
        );
        self.discovered_name = record.device_name().map(String::from);
        self.use_endpoint(endpoint);
        FlowResult::form(FlowStep::Link)
    }

    /// Pair with the device. `submitted` is false until the user confirms
    /// the device is in pairing mode.
    pub async fn step_link(&mut self, submitted: bool) -> FlowResult {
        let Some(client) = self.client.clone().filter(|_| submitted) else {
            return FlowResult::form(FlowStep::Link);
        };

        let paired = async {
            let token = client.acquire_token().await?;
            let snapshot = client.fetch_snapshot().await?;
            Ok::<_, Error>((token, snapshot))
        }
        .await;

        match paired {
            Ok((token, snapshot)) => {
                if self.configured.contains(&snapshot.serial_no) {
                    return FlowResult::Abort {
                        reason: AbortReason::AlreadyConfigured,
                    };
                }
                info!("paired with {} ({})", snapshot.name, snapshot.serial_no);
                FlowResult::CreateEntry {
                    title: snapshot.name.clone(),
                    unique_id: snapshot.serial_no.clone(),
                    data: EntryData {
                        host: client.endpoint().clone(),
                        token,
                    },
                }
            }
            Err(e) => {
                warn!("pairing with {} failed: {e}", client.endpoint());
                FlowResult::form_with_error(FlowStep::Link, "unknown")
            }
        }
    }

    fn use_endpoint(&mut self, endpoint: DeviceEndpoint) {
        self.client = Some(Arc::new(DeviceClient::with_options(
            endpoint,
            None,
            &self.options,
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(location: &str) -> DiscoveryRecord {
        DiscoveryRecord {
            location: location.into(),
            properties: HashMap::from([
                (DISCOVERY_NAME_KEY.to_string(), "Shapes 4F2A".to_string()),
                (DISCOVERY_ID_KEY.to_string(), "A1:B2:C3".to_string()),
            ]),
        }
    }

    #[test]
    fn test_user_step_shows_form_first() {
        let mut flow = ConfigFlow::new(HashSet::new());
        assert_eq!(flow.step_user(None), FlowResult::form(FlowStep::User));
        assert!(flow.endpoint().is_none());
    }

    #[test]
    fn test_user_step_normalises_host() {
        let mut flow = ConfigFlow::new(HashSet::new());
        assert_eq!(
            flow.step_user(Some("192.168.1.23")),
            FlowResult::form(FlowStep::Link)
        );
        assert_eq!(flow.endpoint().unwrap().to_string(), "192.168.1.23:16021");
    }

    #[test]
    fn test_user_step_rejects_bad_host() {
        let mut flow = ConfigFlow::new(HashSet::new());
        assert_eq!(flow.step_user(Some("")), FlowResult::form(FlowStep::User));
        assert_eq!(
            flow.step_user(Some("host:port")),
            FlowResult::form(FlowStep::User)
        );
        assert!(flow.endpoint().is_none());
    }

    #[test]
    fn test_discovery_location_forms() {
        let ep = record("http://192.168.1.36:16021").endpoint().unwrap();
        assert_eq!(ep, DeviceEndpoint::new("192.168.1.36", 16021));

        let ep = record("http://192.168.1.36/").endpoint().unwrap();
        assert_eq!(ep.port(), DeviceEndpoint::DEFAULT_PORT);

        let ep = record("192.168.1.36:8080").endpoint().unwrap();
        assert_eq!(ep.port(), 8080);

        assert!(record("http://").endpoint().is_err());
    }

    #[test]
    fn test_discovery_skips_user_step() {
        let mut flow = ConfigFlow::new(HashSet::new());
        assert_eq!(
            flow.step_discovery(&record("http://10.0.0.9:16021")),
            FlowResult::form(FlowStep::Link)
        );
        assert_eq!(flow.discovered_name(), Some("Shapes 4F2A"));
        assert_eq!(flow.endpoint().unwrap().host(), "10.0.0.9");
    }

    #[test]
    fn test_discovery_without_location_aborts() {
        let mut flow = ConfigFlow::new(HashSet::new());
        assert_eq!(
            flow.step_discovery(&record("")),
            FlowResult::Abort {
                reason: AbortReason::InvalidDiscoveryInfo
            }
        );
    }

    #[tokio::test]
    async fn test_link_without_submit_shows_form() {
        let mut flow = ConfigFlow::new(HashSet::new());
        flow.step_user(Some("10.0.0.9"));
        assert_eq!(flow.step_link(false).await, FlowResult::form(FlowStep::Link));
    }

    #[test]
    fn test_flow_result_wire_shape() {
        let value = serde_json::to_value(FlowResult::form_with_error(FlowStep::Link, "unknown"))
            .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "show_form", "step_id": "link", "errors": {"base": "unknown"}})
        );
    }
}
