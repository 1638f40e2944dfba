//! Provisioning engine for WISP device provisioning.
//!
//! Discovers provisionable devices over a pluggable transport, runs an
//! SRP6a handshake keyed by an operator-supplied proof of possession, and
//! drives the Wi-Fi provisioning flow over the resulting ciphered channel.
//!
//! The entry point is [`engine::ProvisioningEngine`]; the surrounding app
//! supplies a [`transport::Transport`] implementation and receives state
//! changes through [`session::EngineObserver`].

#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod errors;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{Endpoints, EngineConfig};
pub use engine::{DeviceScan, ProvisioningEngine};
pub use errors::{
    ProtocolError, ProvisioningError, SecurityError, TransportError, WifiProvisioningError,
};
pub use session::{EngineObserver, Phase, ProvisioningSession};
pub use transport::{ProvisioningDevice, Transport, TransportEvent, TransportKind};
