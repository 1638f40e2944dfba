//! Provisioning session state.
//!
//! One session tracks one attempt at provisioning one device. The phase
//! only moves through [`ProvisioningEngine`](crate::engine::ProvisioningEngine)
//! operations; observers get a callback on every change.

use crate::errors::ProvisioningError;
use crate::transport::ProvisioningDevice;
use wisp_proto::WifiNetwork;

/// Where the provisioning flow currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ScanningDevices,
    Connecting,
    EstablishingSession,
    ScanningWifi,
    SendingCredentials,
    ApplyingConfig,
    Verifying,
    Success,
    Failure,
}

impl Phase {
    /// Coarse progress for UI display, 0.0 at idle through 1.0 at success.
    /// Failure keeps the progress of the phase it happened in meaningless,
    /// so it reports 0.0.
    pub fn progress(self) -> f32 {
        match self {
            Phase::Idle => 0.0,
            Phase::ScanningDevices => 0.1,
            Phase::Connecting => 0.2,
            Phase::EstablishingSession => 0.35,
            Phase::ScanningWifi => 0.5,
            Phase::SendingCredentials => 0.65,
            Phase::ApplyingConfig => 0.8,
            Phase::Verifying => 0.9,
            Phase::Success => 1.0,
            Phase::Failure => 0.0,
        }
    }
}

/// Mutable view of the current provisioning attempt.
#[derive(Clone, Debug)]
pub struct ProvisioningSession {
    pub phase: Phase,
    /// The device being provisioned, once connected.
    pub device: Option<ProvisioningDevice>,
    /// Networks from the most recent Wi-Fi scan.
    pub networks: Vec<WifiNetwork>,
    /// The error that moved the session to [`Phase::Failure`], if any.
    pub last_error: Option<ProvisioningError>,
}

impl ProvisioningSession {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            device: None,
            networks: Vec::new(),
            last_error: None,
        }
    }

    pub fn progress(&self) -> f32 {
        self.phase.progress()
    }
}

impl Default for ProvisioningSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Callbacks for session changes. All methods default to no-ops so
/// implementors pick only what they care about.
pub trait EngineObserver: Send + Sync {
    fn on_phase_changed(&self, _phase: Phase) {}
    fn on_devices_updated(&self, _devices: &[ProvisioningDevice]) {}
    fn on_error(&self, _error: &ProvisioningError) {}
}
