//! Message types carried by the provisioning wire protocol.

/// Wi-Fi authentication modes reported by the peer's scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WifiAuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
}

impl WifiAuthMode {
    /// Wire byte for this mode.
    pub fn to_wire(self) -> u8 {
        match self {
            WifiAuthMode::Open => 0,
            WifiAuthMode::Wep => 1,
            WifiAuthMode::WpaPsk => 2,
            WifiAuthMode::Wpa2Psk => 3,
            WifiAuthMode::WpaWpa2Psk => 4,
            WifiAuthMode::Wpa2Enterprise => 5,
            WifiAuthMode::Wpa3Psk => 6,
            WifiAuthMode::Wpa2Wpa3Psk => 7,
        }
    }

    /// Parse a wire byte; `None` for values this protocol version does not
    /// define.
    pub fn from_wire(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => WifiAuthMode::Open,
            1 => WifiAuthMode::Wep,
            2 => WifiAuthMode::WpaPsk,
            3 => WifiAuthMode::Wpa2Psk,
            4 => WifiAuthMode::WpaWpa2Psk,
            5 => WifiAuthMode::Wpa2Enterprise,
            6 => WifiAuthMode::Wpa3Psk,
            7 => WifiAuthMode::Wpa2Wpa3Psk,
            _ => return None,
        })
    }
}

/// A network reported by the peer's Wi-Fi scan. Transient; rebuilt on
/// every scan.
///
/// SSIDs are raw bytes on the air and on this wire; they carry no UTF-8
/// guarantee and must round-trip unmodified into the config request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WifiNetwork {
    pub ssid: Vec<u8>,
    pub rssi: i8,
    pub channel: u8,
    pub auth_mode: WifiAuthMode,
}

/// Credentials submitted to the peer. The password lives only as long as
/// it takes to build and cipher the config request; it is never logged.
#[derive(Clone)]
pub struct WifiCredentials {
    /// Raw SSID bytes, usually taken from a [`WifiNetwork`] scan entry.
    pub ssid: Vec<u8>,
    pub password: String,
}

impl std::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &String::from_utf8_lossy(&self.ssid))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Request envelope: named endpoint plus opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub endpoint: String,
    pub payload: Vec<u8>,
}

/// Response envelope. Status zero is success; anything else is a
/// peer-reported failure for the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u8,
    pub payload: Vec<u8>,
}

impl Response {
    /// Peer status byte meaning success.
    pub const STATUS_SUCCESS: u8 = 0;

    pub fn is_success(&self) -> bool {
        self.status == Self::STATUS_SUCCESS
    }
}

/// One leg of the SRP exchange from the client. The handshake takes two
/// round trips: the first request carries the public key with an empty
/// proof, the second carries the proof with an empty public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRequest {
    pub public_key: Vec<u8>,
    pub proof: Vec<u8>,
}

/// One leg of the SRP exchange from the server. Fields not applicable to
/// the current leg are empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionResponse {
    pub server_public_key: Vec<u8>,
    pub server_proof: Vec<u8>,
    pub salt: Vec<u8>,
}

/// Ask the peer to scan for networks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WifiScanRequest {
    pub passive: bool,
}

/// Scan results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WifiScanResponse {
    pub networks: Vec<WifiNetwork>,
}

/// Credential submission; always ciphered once a session exists.
#[derive(Clone, PartialEq, Eq)]
pub struct WifiConfigRequest {
    /// Raw SSID bytes, exactly as scanned.
    pub ssid: Vec<u8>,
    pub password: String,
}

impl std::fmt::Debug for WifiConfigRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiConfigRequest")
            .field("ssid", &String::from_utf8_lossy(&self.ssid))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Single-byte command: commit the submitted configuration and start
/// associating.
pub const CMD_APPLY_CONFIG: u8 = 0x01;

/// Single-byte command: report association status.
pub const CMD_GET_STATUS: u8 = 0x02;

/// Why the peer failed to join the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    AuthFailed,
    NetworkNotFound,
    InvalidCredentials,
    ConnectionFailed,
    Unknown(u8),
}

impl FailureReason {
    pub fn to_wire(self) -> u8 {
        match self {
            FailureReason::AuthFailed => 0,
            FailureReason::NetworkNotFound => 1,
            FailureReason::InvalidCredentials => 2,
            FailureReason::ConnectionFailed => 3,
            FailureReason::Unknown(byte) => byte,
        }
    }

    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0 => FailureReason::AuthFailed,
            1 => FailureReason::NetworkNotFound,
            2 => FailureReason::InvalidCredentials,
            3 => FailureReason::ConnectionFailed,
            other => FailureReason::Unknown(other),
        }
    }
}

/// Association progress reported by the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisioningStatus {
    /// Still negotiating Wi-Fi association.
    InProgress,
    /// Joined the network.
    Success,
    /// Gave up; the reason says why.
    Failed(FailureReason),
}

/// Status response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: ProvisioningStatus,
}

/// Application-defined key/value pairs delivered alongside provisioning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomDataRequest {
    pub entries: Vec<(String, Vec<u8>)>,
}
