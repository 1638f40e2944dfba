//! Transport contract consumed by the provisioning engine.
//!
//! The engine is transport-agnostic: it needs a byte channel with
//! connect/send/disconnect plus a push-based event stream. The concrete
//! binding in the surrounding app is BLE GATT (one write characteristic,
//! one notify characteristic, discovered via a well-known service
//! identifier), but nothing in this crate depends on that.

use async_trait::async_trait;

use crate::errors::TransportError;

/// Kind of channel a device was discovered on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Ble,
}

/// A provisionable device seen during discovery.
///
/// Immutable once created; the engine deduplicates by `id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisioningDevice {
    /// Stable identifier (BLE address on the GATT binding).
    pub id: String,
    /// Advertised display name.
    pub name: String,
    /// Signal strength at discovery time, dBm.
    pub rssi: Option<i16>,
    pub kind: TransportKind,
    /// Advertised service identifier the device was matched on.
    pub service_id: String,
}

/// Push events delivered by the transport.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// A device advertisement observed while discovery is running.
    Advertisement(ProvisioningDevice),
    /// A complete notify frame from the connected peer.
    Frame(Vec<u8>),
    /// The link dropped; any in-flight request fails.
    Disconnected,
}

/// Byte-channel abstraction bound by the surrounding application.
///
/// Implementations deliver [`TransportEvent`]s through the channel handed
/// to the engine at construction time; the engine owns the receiving end
/// exclusively.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin emitting [`TransportEvent::Advertisement`] events.
    async fn start_discovery(&self) -> Result<(), TransportError>;

    /// Stop emitting advertisements.
    async fn stop_discovery(&self) -> Result<(), TransportError>;

    /// Open the channel to the given device.
    async fn connect(&self, device_id: &str) -> Result<(), TransportError>;

    /// Write one frame. Fails with [`TransportError::WriteFailed`] when the
    /// channel rejects the write.
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Close the channel.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Release underlying platform resources. The transport must not emit
    /// further events afterwards.
    async fn dispose(&self);
}
