//! End-to-end engine flows against a scripted peer.
//!
//! The peer implements the server side of the SRP exchange independently
//! (num-bigint + sha2) so the handshake tests exercise real key agreement
//! rather than canned byte strings.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use num_bigint::BigUint;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use wisp_core::engine::ProvisioningEngine;
use wisp_core::errors::{ProtocolError, ProvisioningError, SecurityError, WifiProvisioningError};
use wisp_core::session::Phase;
use wisp_core::testing::MockTransport;
use wisp_core::transport::{ProvisioningDevice, TransportKind};
use wisp_core::EngineConfig;
use wisp_crypto::cipher::MessageCipher;
use wisp_crypto::srp::{group_prime, GROUP_GENERATOR, SRP_IDENTITY};
use wisp_proto::{
    ProvisioningStatus, Request, Response, SessionRequest, SessionResponse, StatusResponse,
    WifiAuthMode, WifiConfigRequest, WifiCredentials, WifiNetwork, WifiScanResponse,
    CMD_APPLY_CONFIG, CMD_GET_STATUS,
};

const POP: &str = "abcd1234";

fn sha(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for p in parts {
        h.update(p);
    }
    h.finalize().into()
}

/// Server-side SRP state plus scripted provisioning behavior.
struct PeerState {
    salt: Vec<u8>,
    private_key: BigUint,
    verifier: BigUint,
    client_public: Option<Vec<u8>>,
    session_key: Option<[u8; 32]>,
    /// Corrupt the server proof to simulate a wrong secret or tampering.
    tamper_proof: bool,
    /// Status responses handed out in order; the last one repeats.
    status_script: VecDeque<StatusResponse>,
    networks: Vec<WifiNetwork>,
    applied: bool,
    config_received: Option<WifiConfigRequest>,
}

impl PeerState {
    fn new(password: &str) -> Self {
        let n = group_prime();
        let g = BigUint::from(GROUP_GENERATOR);
        let salt = vec![0xA5u8; 16];
        let inner = sha(&[SRP_IDENTITY.as_bytes(), b":", password.as_bytes()]);
        let x = BigUint::from_bytes_be(&sha(&[&salt, &inner]));
        let verifier = g.modpow(&x, &n);
        Self {
            salt,
            private_key: BigUint::from_bytes_be(&[0xE0u8; 32]),
            verifier,
            client_public: None,
            session_key: None,
            tamper_proof: false,
            status_script: VecDeque::new(),
            networks: Vec::new(),
            applied: false,
            config_received: None,
        }
    }

    fn server_public(&self) -> BigUint {
        let n = group_prime();
        let g = BigUint::from(GROUP_GENERATOR);
        let k = BigUint::from_bytes_be(&sha(&[&n.to_bytes_be(), &g.to_bytes_be()]));
        (k * &self.verifier + g.modpow(&self.private_key, &n)) % n
    }

    fn handle_session(&mut self, req: &SessionRequest) -> SessionResponse {
        if !req.public_key.is_empty() {
            // Leg one: remember A, hand back B and the salt.
            self.client_public = Some(req.public_key.clone());
            return SessionResponse {
                server_public_key: self.server_public().to_bytes_be(),
                server_proof: Vec::new(),
                salt: self.salt.clone(),
            };
        }

        // Leg two: derive the shared key and answer M1 with M2.
        let n = group_prime();
        let a_pub = self.client_public.clone().expect("leg two before leg one");
        let b_pub = self.server_public();
        let u = BigUint::from_bytes_be(&sha(&[&a_pub, &b_pub.to_bytes_be()]));
        let shared = (BigUint::from_bytes_be(&a_pub) * self.verifier.modpow(&u, &n))
            .modpow(&self.private_key, &n);
        let session_key = sha(&[&shared.to_bytes_be()]);
        self.session_key = Some(session_key);

        let mut proof = sha(&[&a_pub, &req.proof, &session_key]).to_vec();
        if self.tamper_proof {
            proof[0] ^= 0xFF;
        }
        SessionResponse {
            server_public_key: Vec::new(),
            server_proof: proof,
            salt: Vec::new(),
        }
    }

    fn cipher(&self) -> MessageCipher {
        MessageCipher::new(self.session_key.expect("no session key"))
    }

    fn handle_secure(&mut self, endpoint: &str, plain: &[u8]) -> Vec<u8> {
        match endpoint {
            "prov-scan" => WifiScanResponse {
                networks: self.networks.clone(),
            }
            .encode()
            .expect("encode scan response"),
            "prov-config" => match plain {
                [CMD_GET_STATUS] => {
                    let status = if self.status_script.len() > 1 {
                        self.status_script.pop_front().expect("nonempty script")
                    } else {
                        *self.status_script.front().expect("empty status script")
                    };
                    status.encode()
                }
                [CMD_APPLY_CONFIG] => {
                    self.applied = true;
                    Vec::new()
                }
                _ => {
                    self.config_received =
                        Some(WifiConfigRequest::decode(plain).expect("decode config request"));
                    Vec::new()
                }
            },
            "custom-data" => Vec::new(),
            other => panic!("unexpected endpoint {other}"),
        }
    }
}

/// Wire a shared mock transport to the peer and build an engine over a
/// clone of it.
fn engine_with_peer(
    peer: Arc<Mutex<PeerState>>,
    config: EngineConfig,
) -> (ProvisioningEngine<MockTransport>, MockTransport) {
    let (mock, events) = MockTransport::new();
    mock.set_responder(move |frame| {
        let request = Request::decode(frame).expect("decode request frame");
        let mut peer = peer.lock();
        let payload = if request.endpoint == "prov-session" {
            let leg = SessionRequest::decode(&request.payload).expect("decode session leg");
            peer.handle_session(&leg)
                .encode()
                .expect("encode session response")
        } else {
            let cipher = peer.cipher();
            let plain = cipher
                .decrypt_wire(&request.payload)
                .expect("decrypt request");
            let reply = peer.handle_secure(&request.endpoint, &plain);
            if reply.is_empty() {
                Vec::new()
            } else {
                cipher.encrypt(&reply).expect("encrypt reply").to_wire()
            }
        };
        let response = Response { status: 0, payload };
        Some(response.encode().expect("encode response"))
    });
    let engine = ProvisioningEngine::new(mock.clone(), events, config);
    (engine, mock)
}

fn fast_config() -> EngineConfig {
    EngineConfig::default()
        .with_request_timeout(Duration::from_millis(500))
        .with_handshake_timeout(Duration::from_millis(500))
        .with_scan_timeout(Duration::from_millis(200))
        .with_status_polling(Duration::from_millis(10), 5)
}

fn device(id: &str) -> ProvisioningDevice {
    ProvisioningDevice {
        id: id.to_owned(),
        name: format!("wisp-{id}"),
        rssi: Some(-40),
        kind: TransportKind::Ble,
        service_id: "test-service".to_owned(),
    }
}

async fn connected_engine(
    peer: Arc<Mutex<PeerState>>,
    config: EngineConfig,
) -> (ProvisioningEngine<MockTransport>, MockTransport) {
    let (mut engine, mock) = engine_with_peer(peer, config);
    engine.connect(&device("aa:bb")).await.expect("connect");
    (engine, mock)
}

#[tokio::test]
async fn handshake_establishes_authenticated_session() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    let (mut engine, _mock) = connected_engine(Arc::clone(&peer), fast_config()).await;

    engine.establish_session(POP).await.expect("handshake");

    assert!(engine.is_authenticated());
    assert_eq!(engine.session().phase, Phase::Idle);
    assert!(engine.session().last_error.is_none());
    // Both sides arrived at the same key.
    assert!(peer.lock().session_key.is_some());
}

#[tokio::test]
async fn tampered_server_proof_fails_the_session() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    peer.lock().tamper_proof = true;
    let (mut engine, _mock) = connected_engine(Arc::clone(&peer), fast_config()).await;

    let err = engine
        .establish_session(POP)
        .await
        .expect_err("proof must be rejected");

    assert_eq!(
        err,
        ProvisioningError::Security(SecurityError::ProofMismatch)
    );
    assert!(!err.is_recoverable());
    assert!(!engine.is_authenticated());
    assert_eq!(engine.session().phase, Phase::Failure);
    assert_eq!(engine.session().last_error, Some(err));
}

#[tokio::test]
async fn wrong_proof_of_possession_fails_the_session() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    let (mut engine, _mock) = connected_engine(Arc::clone(&peer), fast_config()).await;

    let err = engine
        .establish_session("wrong-secret")
        .await
        .expect_err("mismatched secret must fail");

    assert_eq!(
        err,
        ProvisioningError::Security(SecurityError::ProofMismatch)
    );
    assert!(!engine.is_authenticated());
}

#[tokio::test]
async fn provision_before_session_is_rejected_without_io() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    let (mut engine, mock) = connected_engine(Arc::clone(&peer), fast_config()).await;

    let credentials = WifiCredentials {
        ssid: b"HomeNet".to_vec(),
        password: "hunter22".into(),
    };
    let err = engine
        .provision_wifi(credentials)
        .await
        .expect_err("no session yet");

    assert_eq!(
        err,
        ProvisioningError::Protocol(ProtocolError::NotConnected)
    );
    assert!(mock.sent_frames().is_empty());
}

#[tokio::test]
async fn full_provisioning_flow_reaches_success() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    {
        let mut p = peer.lock();
        p.networks = vec![
            WifiNetwork {
                ssid: b"HomeNet".to_vec(),
                rssi: -52,
                channel: 6,
                auth_mode: WifiAuthMode::Wpa2Psk,
            },
            WifiNetwork {
                ssid: b"Cafe".to_vec(),
                rssi: -80,
                channel: 11,
                auth_mode: WifiAuthMode::Open,
            },
        ];
        p.status_script = VecDeque::from([
            StatusResponse {
                status: ProvisioningStatus::InProgress,
            },
            StatusResponse {
                status: ProvisioningStatus::Success,
            },
        ]);
    }
    let (mut engine, _mock) = connected_engine(Arc::clone(&peer), fast_config()).await;

    engine.establish_session(POP).await.expect("handshake");

    let networks = engine.scan_wifi(false).await.expect("wifi scan");
    assert_eq!(networks.len(), 2);
    assert_eq!(networks[0].ssid, b"HomeNet");

    let credentials = WifiCredentials {
        ssid: b"HomeNet".to_vec(),
        password: "hunter22".into(),
    };
    engine.provision_wifi(credentials).await.expect("provision");

    assert_eq!(engine.session().phase, Phase::Success);
    assert_eq!(engine.session().progress(), 1.0);

    let p = peer.lock();
    assert!(p.applied);
    let received = p.config_received.as_ref().expect("config delivered");
    assert_eq!(received.ssid, b"HomeNet");
    assert_eq!(received.password, "hunter22");
}

#[tokio::test]
async fn association_failure_surfaces_the_reason() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    peer.lock().status_script = VecDeque::from([StatusResponse {
        status: ProvisioningStatus::Failed(wisp_proto::FailureReason::AuthFailed),
    }]);
    let (mut engine, _mock) = connected_engine(Arc::clone(&peer), fast_config()).await;
    engine.establish_session(POP).await.expect("handshake");

    let credentials = WifiCredentials {
        ssid: b"HomeNet".to_vec(),
        password: "wrong".into(),
    };
    let err = engine
        .provision_wifi(credentials)
        .await
        .expect_err("association must fail");

    assert_eq!(
        err,
        ProvisioningError::WifiProvisioning(WifiProvisioningError::AuthFailed)
    );
    assert!(err.is_recoverable());
    assert_eq!(engine.session().phase, Phase::Failure);
}

#[tokio::test]
async fn stuck_association_times_out_after_retry_budget() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    peer.lock().status_script = VecDeque::from([StatusResponse {
        status: ProvisioningStatus::InProgress,
    }]);
    let (mut engine, _mock) = connected_engine(Arc::clone(&peer), fast_config()).await;
    engine.establish_session(POP).await.expect("handshake");

    let credentials = WifiCredentials {
        ssid: b"HomeNet".to_vec(),
        password: "hunter22".into(),
    };
    let err = engine
        .provision_wifi(credentials)
        .await
        .expect_err("budget must run out");

    assert_eq!(err, ProvisioningError::Timeout);
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn device_scan_dedupes_by_id_in_discovery_order() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    let (mut engine, mock) = engine_with_peer(Arc::clone(&peer), fast_config());

    mock.inject_advertisement("aa:bb", "wisp-one", -40);
    mock.inject_advertisement("cc:dd", "wisp-two", -60);
    mock.inject_advertisement("aa:bb", "wisp-one", -41);

    let mut scan = engine.start_scan(Duration::from_millis(200)).await.expect("start scan");
    let first = scan.next().await.expect("next").expect("first device");
    let second = scan.next().await.expect("next").expect("second device");
    assert_eq!(first.id, "aa:bb");
    assert_eq!(second.id, "cc:dd");

    // The duplicate was skipped; the window closes with no third device.
    let third = scan.next().await.expect("next");
    assert!(third.is_none());
    assert_eq!(scan.devices().len(), 2);

    scan.stop().await.expect("stop scan");
    assert_eq!(engine.session().phase, Phase::Idle);
}

#[tokio::test]
async fn scan_window_closes_while_advertisements_keep_arriving() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    let (mut engine, mock) = engine_with_peer(Arc::clone(&peer), fast_config());

    // A feeder that never runs dry: a new distinct device every 60ms.
    let feeder = {
        let mock = mock.clone();
        tokio::spawn(async move {
            for i in 0..10u8 {
                mock.inject_advertisement(&format!("aa:{i:02}"), "wisp-flood", -50);
                tokio::time::sleep(Duration::from_millis(60)).await;
            }
        })
    };

    let start = std::time::Instant::now();
    let mut scan = engine
        .start_scan(Duration::from_millis(150))
        .await
        .expect("start scan");
    let mut count = 0;
    while scan.next().await.expect("next").is_some() {
        count += 1;
    }
    let elapsed = start.elapsed();
    scan.stop().await.expect("stop scan");
    feeder.abort();

    // The sequence must end at the window, not run as long as devices
    // keep advertising.
    assert!(count < 10, "scan yielded {count} devices past its window");
    assert!(
        elapsed < Duration::from_millis(600),
        "scan ran {elapsed:?} against a 150ms window"
    );
}

#[tokio::test]
async fn silent_peer_times_out_and_releases_the_request_slot() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    let config = fast_config().with_handshake_timeout(Duration::from_millis(50));
    let (mut engine, mock) = connected_engine(Arc::clone(&peer), config).await;
    mock.set_silent(true);

    let start = std::time::Instant::now();
    let err = engine
        .establish_session(POP)
        .await
        .expect_err("silent peer must time out");
    assert_eq!(err, ProvisioningError::Timeout);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(!engine.request_in_flight());

    // The slot was released; a live peer answers the retry.
    mock.set_silent(false);
    engine.establish_session(POP).await.expect("retry succeeds");
    assert!(engine.is_authenticated());
}

#[tokio::test]
async fn disconnect_clears_the_session() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    let (mut engine, _mock) = connected_engine(Arc::clone(&peer), fast_config()).await;
    engine.establish_session(POP).await.expect("handshake");
    assert!(engine.is_authenticated());

    engine.disconnect().await.expect("disconnect");

    assert!(!engine.is_authenticated());
    assert_eq!(engine.session().phase, Phase::Idle);
    assert!(engine.session().device.is_none());
}

#[tokio::test]
async fn custom_data_is_ciphered_once_a_session_exists() {
    let peer = Arc::new(Mutex::new(PeerState::new(POP)));
    let (mut engine, mock) = connected_engine(Arc::clone(&peer), fast_config()).await;
    engine.establish_session(POP).await.expect("handshake");

    engine
        .send_custom_data(vec![("device-name".into(), b"kitchen".to_vec())])
        .await
        .expect("custom data");

    // The payload on the wire must not contain the plaintext value.
    let frames = mock.sent_frames();
    let last = frames.last().expect("frame sent");
    let request = Request::decode(last).expect("decode frame");
    assert_eq!(request.endpoint, "custom-data");
    assert!(!request
        .payload
        .windows(b"kitchen".len())
        .any(|w| w == b"kitchen"));
}
