use uuid::Uuid;

/// All error types that can occur when talking to a Nanoleaf controller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to serialize data to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// The HTTP transport failed before a response was received.
    #[error("http {action} error: {err}")]
    Transport {
        action: String,
        #[source]
        err: reqwest::Error,
    },

    /// Token creation or validation was rejected by the device.
    #[error("authorization rejected by device (status {status:?})")]
    AuthFailure { status: Option<u16> },

    /// No token has been acquired yet for a call that needs one.
    #[error("no authorization token; pair with the device first")]
    MissingToken,

    /// The device answered with an unexpected status code.
    #[error("device unreachable: {action} returned status {status}")]
    Unreachable { action: String, status: u16 },

    /// A stream frame could not be decoded into a gesture record.
    #[error("malformed stream payload: {0}")]
    MalformedPayload(String),

    /// The event stream connection closed.
    #[error("event stream ended")]
    StreamEnded,

    /// A user supplied host string could not be turned into `host:port`.
    #[error("invalid host {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    /// A trigger configuration named an unknown trigger type.
    #[error("invalid trigger type {0:?}")]
    InvalidTrigger(String),

    /// The configuration entry has no loaded controller.
    #[error("config entry {0} is not loaded")]
    EntryNotLoaded(Uuid),
}

impl Error {
    /// Create a new transport error. The request URL is stripped, since
    /// it carries the auth token.
    pub fn transport(action: &str, err: reqwest::Error) -> Self {
        Error::Transport {
            action: action.to_string(),
            err: err.without_url(),
        }
    }

    /// Create a new unreachable error
    pub fn unreachable(action: &str, status: reqwest::StatusCode) -> Self {
        Error::Unreachable {
            action: action.to_string(),
            status: status.as_u16(),
        }
    }

    /// Create a new invalid host error
    pub fn invalid_host(host: &str, reason: &str) -> Self {
        Error::InvalidHost {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error means the device could not be reached or answered badly.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Unreachable { .. } | Error::Transport { .. })
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
