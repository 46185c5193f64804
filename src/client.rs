//! REST client for a single controller.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};

use crate::config::{DeviceEndpoint, IntegrationOptions};
use crate::errors::Error;
use crate::history::{MessageHistory, MessageType};
use crate::payload::{BrightnessPayload, EffectPayload};
use crate::snapshot::DeviceSnapshot;
use crate::types::{Brightness, Rgb, Transition};

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Deserialize)]
struct NewTokenResponse {
    #[serde(default)]
    auth_token: Option<String>,
}

/// Talks to one controller over its REST API.
///
/// The client owns the authorization token and the cached
/// [`DeviceSnapshot`]. Both sit behind async locks, so a `DeviceClient`
/// shared through an `Arc` can serve brightness and color calls from
/// several tasks at once; every request reads a whole token, never a
/// half-written one.
///
/// # Example
///
/// ```
/// use nanoleaf_panels_rs::{DeviceClient, DeviceEndpoint};
///
/// let client = DeviceClient::new(DeviceEndpoint::new("192.168.1.36", 16021), None);
/// assert_eq!(client.endpoint().to_string(), "192.168.1.36:16021");
/// ```
#[derive(Debug)]
pub struct DeviceClient {
    endpoint: DeviceEndpoint,
    http: reqwest::Client,
    request_timeout: Duration,
    token: RwLock<Option<Arc<str>>>,
    snapshot: Mutex<Option<Arc<DeviceSnapshot>>>,
    history: Mutex<MessageHistory>,
}

impl DeviceClient {
    pub fn new(endpoint: DeviceEndpoint, token: Option<&str>) -> Self {
        Self::with_options(endpoint, token, &IntegrationOptions::default())
    }

    pub fn with_options(
        endpoint: DeviceEndpoint,
        token: Option<&str>,
        options: &IntegrationOptions,
    ) -> Self {
        Self::with_http(endpoint, token, reqwest::Client::new(), options.request_timeout)
    }

    /// Create a client around a pre-built `reqwest::Client`.
    ///
    /// The client must not carry a global timeout, or the event stream will
    /// be cut off; per-request timeouts are applied here instead.
    pub fn with_http(
        endpoint: DeviceEndpoint,
        token: Option<&str>,
        http: reqwest::Client,
        request_timeout: Duration,
    ) -> Self {
        DeviceClient {
            endpoint,
            http,
            request_timeout,
            token: RwLock::new(token.map(Arc::from)),
            snapshot: Mutex::new(None),
            history: Mutex::new(MessageHistory::new()),
        }
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Current token, if one has been acquired or adopted.
    pub async fn token(&self) -> Option<String> {
        self.token.read().await.as_deref().map(String::from)
    }

    pub async fn history(&self) -> MessageHistory {
        self.history.lock().await.clone()
    }

    /// Ask the device for a new token. The device only grants one while its
    /// power button is held in pairing mode.
    pub async fn acquire_token(&self) -> Result<String> {
        let url = format!("{}/new", self.endpoint.api_base());
        let (status, body) = self.send("new_token", Method::POST, &url, None).await?;
        if status != StatusCode::OK {
            return Err(Error::AuthFailure {
                status: Some(status.as_u16()),
            });
        }

        let token = serde_json::from_slice::<NewTokenResponse>(&body)
            .ok()
            .and_then(|r| r.auth_token)
            .filter(|t| !t.is_empty())
            .ok_or(Error::AuthFailure {
                status: Some(status.as_u16()),
            })?;

        *self.token.write().await = Some(Arc::from(token.as_str()));
        debug!("acquired token for {}", self.endpoint);
        Ok(token)
    }

    /// Check a candidate token with a read. Adopts it only when valid.
    pub async fn validate_token(&self, candidate: &str) -> Result<bool> {
        if candidate.is_empty() {
            return Ok(false);
        }
        let url = format!("{}/{}", self.endpoint.api_base(), candidate);
        let (status, _) = self.send("validate_token", Method::GET, &url, None).await?;
        if status != StatusCode::OK {
            debug!("token rejected by {} with {}", self.endpoint, status);
            return Ok(false);
        }
        *self.token.write().await = Some(Arc::from(candidate));
        Ok(true)
    }

    /// Return the cached snapshot, fetching it on first use.
    ///
    /// Concurrent callers share a single request: the cache lock is held
    /// across the fetch.
    pub async fn fetch_snapshot(&self) -> Result<Arc<DeviceSnapshot>> {
        let mut cached = self.snapshot.lock().await;
        if let Some(snapshot) = cached.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let url = self.token_url("").await?;
        let (status, body) = self.send("get_info", Method::GET, &url, None).await?;
        if status != StatusCode::OK {
            return Err(Error::unreachable("get_info", status));
        }
        let snapshot: DeviceSnapshot = serde_json::from_slice(&body).map_err(|e| {
            warn!("malformed snapshot from {}: {}", self.endpoint, e);
            Error::JsonLoad(e)
        })?;

        let snapshot = Arc::new(snapshot);
        *cached = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drop the cached snapshot so the next fetch hits the device.
    pub async fn invalidate_snapshot(&self) {
        self.snapshot.lock().await.take();
    }

    /// Set the brightness of every panel. Returns the applied value on any
    /// 2xx response. Never retries.
    pub async fn set_brightness(
        &self,
        brightness: Brightness,
        transition: Transition,
    ) -> Result<Brightness> {
        let url = self.token_url("/state/brightness").await?;
        let body = serde_json::to_value(BrightnessPayload::new(brightness, transition))
            .map_err(Error::JsonDump)?;
        let (status, _) = self
            .send("set_brightness", Method::PUT, &url, Some(body))
            .await?;
        if status.is_success() {
            Ok(brightness)
        } else {
            Err(Error::unreachable("set_brightness", status))
        }
    }

    /// Paint one panel with a static color. Success means HTTP 204.
    pub async fn display_static_color(
        &self,
        panel_id: u32,
        rgb: Rgb,
        transition: Transition,
    ) -> Result<bool> {
        let url = self.token_url("/effects").await?;
        let body = serde_json::to_value(EffectPayload::static_color(panel_id, rgb, transition))
            .map_err(Error::JsonDump)?;
        let (status, _) = self
            .send("display_static_color", Method::PUT, &url, Some(body))
            .await?;
        Ok(status == StatusCode::NO_CONTENT)
    }

    /// URL of the gesture event stream for the given event type ids.
    pub(crate) async fn events_url(&self, event_ids: &[u8]) -> Result<String> {
        let ids = event_ids
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.token_url(&format!("/events?id={ids}")).await
    }

    /// Returns diagnostics including endpoint, snapshot identity, and history.
    /// The token itself is never included.
    pub async fn diagnostics(&self) -> Value {
        let snapshot = self.snapshot.lock().await.clone();
        let history = self.history.lock().await.summary();
        json!({
            "endpoint": self.endpoint.to_string(),
            "has_token": self.token.read().await.is_some(),
            "snapshot": snapshot.map(|s| json!({
                "name": s.name,
                "serial_no": s.serial_no,
                "model": s.model,
                "firmware_version": s.firmware_version,
                "panels": s.panel_layout.layout.position_data.len(),
            })),
            "history": serde_json::to_value(history).unwrap_or(Value::Null),
        })
    }

    async fn token_url(&self, suffix: &str) -> Result<String> {
        let token = self.token.read().await.clone().ok_or(Error::MissingToken)?;
        Ok(format!("{}/{}{}", self.endpoint.api_base(), token, suffix))
    }

    async fn send(
        &self,
        action: &str,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Vec<u8>)> {
        self.history.lock().await.record(
            MessageType::Send,
            action,
            body.clone().unwrap_or(Value::Null),
        );

        let mut request = self
            .http
            .request(method, url)
            .timeout(self.request_timeout);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let result: Result<(StatusCode, Vec<u8>)> = async {
            let response = request
                .send()
                .await
                .map_err(|e| Error::transport(action, e))?;
            let status = response.status();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::transport(action, e))?;
            Ok((status, bytes.to_vec()))
        }
        .await;

        let mut history = self.history.lock().await;
        match &result {
            Ok((status, _)) => {
                history.record(
                    MessageType::Receive,
                    action,
                    json!({"status": status.as_u16()}),
                );
                if !status.is_success() {
                    history.record_error(&format!("{action} returned {status}"));
                }
            }
            Err(e) => history.record_error(&e.to_string()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calls_without_token_fail_fast() {
        let client = DeviceClient::new(DeviceEndpoint::new("127.0.0.1", 1), None);
        assert_eq!(
            client.fetch_snapshot().await.unwrap_err(),
            Error::MissingToken
        );
        assert_eq!(client.token().await, None);
    }

    #[tokio::test]
    async fn test_events_url_joins_ids() {
        let client = DeviceClient::new(DeviceEndpoint::new("10.0.0.2", 16021), Some("tok"));
        assert_eq!(
            client.events_url(&[4]).await.unwrap(),
            "http://10.0.0.2:16021/api/v1/tok/events?id=4"
        );
        assert_eq!(
            client.events_url(&[2, 4]).await.unwrap(),
            "http://10.0.0.2:16021/api/v1/tok/events?id=2,4"
        );
    }

    #[tokio::test]
    async fn test_empty_candidate_is_invalid_without_request() {
        let client = DeviceClient::new(DeviceEndpoint::new("127.0.0.1", 1), None);
        assert!(!client.validate_token("").await.unwrap());
        assert!(client.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_diagnostics_hide_token() {
        let client = DeviceClient::new(DeviceEndpoint::new("10.0.0.2", 16021), Some("secret"));
        let diag = client.diagnostics().await;
        assert_eq!(diag["has_token"], true);
        assert!(!diag.to_string().contains("secret"));
    }
}
