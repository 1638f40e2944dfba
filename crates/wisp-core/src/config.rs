//! Engine configuration.
//!
//! The surrounding app owns these values; the engine only consumes them.

use std::time::Duration;

/// Named wire endpoints the peer exposes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    /// SRP session establishment.
    pub session: String,
    /// Wi-Fi scanning.
    pub scan: String,
    /// Credential submission, apply, and status.
    pub config: String,
    /// Application-defined key/value data.
    pub custom: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            session: "prov-session".into(),
            scan: "prov-scan".into(),
            config: "prov-config".into(),
            custom: "custom-data".into(),
        }
    }
}

/// Tunables for one engine instance.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Well-known service identifier devices advertise.
    pub service_id: String,
    pub endpoints: Endpoints,
    /// Deadline for opening the channel.
    pub connect_timeout: Duration,
    /// Deadline for a generic request/response exchange.
    pub request_timeout: Duration,
    /// Deadline for a Wi-Fi scan exchange; scans are slow on constrained
    /// peers.
    pub scan_timeout: Duration,
    /// Deadline for each handshake round trip.
    pub handshake_timeout: Duration,
    /// Interval between status polls after apply.
    pub status_poll_interval: Duration,
    /// Status polls before giving up on association.
    pub max_status_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_id: "0000fff0-0000-1000-8000-00805f9b34fb".into(),
            endpoints: Endpoints::default(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            scan_timeout: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(10),
            status_poll_interval: Duration::from_secs(2),
            max_status_retries: 10,
        }
    }
}

impl EngineConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_status_polling(mut self, interval: Duration, max_retries: u32) -> Self {
        self.status_poll_interval = interval;
        self.max_status_retries = max_retries;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}
