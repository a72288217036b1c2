//! Request/response header.

use serde::{Deserialize, Serialize};

/// Framing header sent once per request and echoed once per response.
///
/// `seq` is chosen by the caller and opaque to the server: it is not required
/// to be monotonic or unique, only echoed back so the caller can correlate
/// responses with requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Method name in "Service.Method" shape. Not validated at this layer.
    pub service_method: String,

    /// Caller-chosen sequence number, echoed on the response.
    pub seq: u64,

    /// Error message for failed requests; empty when absent and skipped on
    /// the wire.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl Header {
    pub fn new(service_method: impl Into<String>, seq: u64) -> Self {
        Self {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// Marks the header as failed, replacing any previous error.
    pub fn set_error(&mut self, err: impl std::fmt::Display) {
        self.error = err.to_string();
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}
