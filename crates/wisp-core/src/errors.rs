//! Error taxonomy for the provisioning engine.
//!
//! Every engine operation surfaces exactly one [`ProvisioningError`] into
//! session state; internal codec, cipher, and handshake failures are
//! wrapped to the nearest taxonomy member here. Each kind carries a
//! recoverability classification consumed by callers: recoverable errors
//! may retry the same operation, non-recoverable ones require restarting
//! the flow from proof-of-possession entry.

use thiserror::Error;
use wisp_crypto::cipher::CipherError;
use wisp_crypto::srp::SrpError;
use wisp_proto::CodecError;

/// Byte-channel failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("transport disconnected")]
    Disconnected,

    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),
}

/// Handshake and authentication failures. Never recoverable within a
/// session; the operator must re-enter the proof of possession.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("server public key is invalid")]
    InvalidServerKey,

    #[error("server proof verification failed")]
    ProofMismatch,

    /// The cipher layer carries no authentication tag, so a decrypt
    /// failure cannot be told apart from tampering; both end the session.
    #[error("message decryption failed")]
    DecryptFailed,

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Malformed or unexpected frames, and protocol-sequence misuse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("not connected")]
    NotConnected,

    #[error("a request is already in flight")]
    RequestInFlight,

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("peer rejected request with status {0}")]
    RequestFailed(u8),
}

/// Why the peer failed to join the configured network.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WifiProvisioningError {
    #[error("network authentication failed")]
    AuthFailed,

    #[error("network not found")]
    NetworkNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("connection to network failed")]
    ConnectionFailed,

    #[error("provisioning failed with unknown reason {0}")]
    Unknown(u8),
}

/// Unified error surfaced by every engine operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer never answered within the operation's deadline. Always
    /// recoverable: retry the same operation.
    #[error("operation timed out")]
    Timeout,

    #[error("wifi provisioning error: {0}")]
    WifiProvisioning(#[from] WifiProvisioningError),

    #[error("device error: {0}")]
    Device(String),
}

impl ProvisioningError {
    /// Whether the caller may retry without restarting the whole flow.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ProvisioningError::Transport(_) => true,
            ProvisioningError::Security(_) => false,
            ProvisioningError::Protocol(_) => true,
            ProvisioningError::Timeout => true,
            ProvisioningError::WifiProvisioning(e) => {
                !matches!(e, WifiProvisioningError::InvalidCredentials)
            }
            ProvisioningError::Device(_) => true,
        }
    }
}

impl From<CodecError> for ProvisioningError {
    fn from(e: CodecError) -> Self {
        ProvisioningError::Protocol(ProtocolError::Malformed(e.to_string()))
    }
}

impl From<CipherError> for ProvisioningError {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::Truncated => ProvisioningError::Security(SecurityError::DecryptFailed),
            CipherError::RngFailure => ProvisioningError::Device("random generator failure".into()),
        }
    }
}

impl From<SrpError> for ProvisioningError {
    fn from(e: SrpError) -> Self {
        let inner = match e {
            SrpError::InvalidServerKey => SecurityError::InvalidServerKey,
            other => SecurityError::HandshakeFailed(other.to_string()),
        };
        ProvisioningError::Security(inner)
    }
}

impl From<wisp_proto::FailureReason> for WifiProvisioningError {
    fn from(reason: wisp_proto::FailureReason) -> Self {
        use wisp_proto::FailureReason;
        match reason {
            FailureReason::AuthFailed => WifiProvisioningError::AuthFailed,
            FailureReason::NetworkNotFound => WifiProvisioningError::NetworkNotFound,
            FailureReason::InvalidCredentials => WifiProvisioningError::InvalidCredentials,
            FailureReason::ConnectionFailed => WifiProvisioningError::ConnectionFailed,
            FailureReason::Unknown(byte) => WifiProvisioningError::Unknown(byte),
        }
    }
}
