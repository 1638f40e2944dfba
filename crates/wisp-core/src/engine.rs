//! The provisioning engine: discovery, secure session establishment, and
//! the Wi-Fi provisioning flow.
//!
//! The engine owns its transport and the receiving end of the transport
//! event channel, so all request/response correlation happens on one task
//! with no locks. Operations take `&mut self`; a second request while one
//! is outstanding fails with [`ProtocolError::RequestInFlight`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use wisp_crypto::cipher::MessageCipher;
use wisp_crypto::srp::SrpClient;
use wisp_proto::{
    CustomDataRequest, Request, Response, SessionRequest, SessionResponse, StatusResponse,
    WifiCredentials, WifiConfigRequest, WifiNetwork, WifiScanRequest, WifiScanResponse,
    CMD_APPLY_CONFIG, CMD_GET_STATUS, ProvisioningStatus,
};

use crate::config::EngineConfig;
use crate::errors::{
    ProtocolError, ProvisioningError, SecurityError, TransportError, WifiProvisioningError,
};
use crate::session::{EngineObserver, Phase, ProvisioningSession};
use crate::transport::{ProvisioningDevice, Transport, TransportEvent};

/// Drives one provisioning flow over a [`Transport`].
pub struct ProvisioningEngine<T: Transport> {
    transport: T,
    events: mpsc::Receiver<TransportEvent>,
    config: EngineConfig,
    session: ProvisioningSession,
    observers: Vec<Arc<dyn EngineObserver>>,
    cipher: Option<MessageCipher>,
    request_in_flight: bool,
}

impl<T: Transport> ProvisioningEngine<T> {
    /// Build an engine over a transport and the event channel the transport
    /// delivers into.
    pub fn new(transport: T, events: mpsc::Receiver<TransportEvent>, config: EngineConfig) -> Self {
        Self {
            transport,
            events,
            config,
            session: ProvisioningSession::new(),
            observers: Vec::new(),
            cipher: None,
            request_in_flight: false,
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    /// Current session snapshot.
    pub fn session(&self) -> &ProvisioningSession {
        &self.session
    }

    /// Whether the SRP handshake has completed and messages are ciphered.
    pub fn is_authenticated(&self) -> bool {
        self.cipher.is_some()
    }

    /// Whether a request is currently awaiting its response.
    pub fn request_in_flight(&self) -> bool {
        self.request_in_flight
    }

    /// Start device discovery with a fixed scan window. Advertisements
    /// arrive through the returned [`DeviceScan`] until the window elapses;
    /// dropping it (or calling [`DeviceScan::stop`]) ends the scan early.
    pub async fn start_scan(
        &mut self,
        timeout: Duration,
    ) -> Result<DeviceScan<'_, T>, ProvisioningError> {
        self.transport.start_discovery().await?;
        self.set_phase(Phase::ScanningDevices);
        info!("device discovery started");
        Ok(DeviceScan {
            deadline: Instant::now() + timeout,
            engine: self,
            seen: HashSet::new(),
            devices: Vec::new(),
            stopped: false,
        })
    }

    /// Connect to a discovered device.
    pub async fn connect(&mut self, device: &ProvisioningDevice) -> Result<(), ProvisioningError> {
        self.set_phase(Phase::Connecting);
        info!(device = %device.id, "connecting");
        let connect = self.transport.connect(&device.id);
        match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(())) => {
                self.session.device = Some(device.clone());
                self.set_phase(Phase::Idle);
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail(e.into())),
            Err(_) => Err(self.fail(ProvisioningError::Timeout)),
        }
    }

    /// Run the SRP6a handshake with the operator-supplied proof of
    /// possession. On success every subsequent exchange is ciphered with
    /// the derived session key.
    ///
    /// The secret is consumed by the key derivation and zeroized before
    /// this method returns; it is never sent or logged.
    pub async fn establish_session(
        &mut self,
        proof_of_possession: &str,
    ) -> Result<(), ProvisioningError> {
        if self.session.device.is_none() {
            return Err(ProtocolError::NotConnected.into());
        }
        self.set_phase(Phase::EstablishingSession);
        self.cipher = None;

        let mut srp = SrpClient::new(proof_of_possession);
        let result = self.run_handshake(&mut srp).await;
        match result {
            Ok(session_key) => {
                self.cipher = Some(MessageCipher::new(session_key));
                self.set_phase(Phase::Idle);
                info!("secure session established");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn run_handshake(
        &mut self,
        srp: &mut SrpClient,
    ) -> Result<[u8; 32], ProvisioningError> {
        let endpoint = self.config.endpoints.session.clone();
        let timeout = self.config.handshake_timeout;

        // Leg one: send A, receive B and the salt.
        let client_public = srp.generate_client_ephemeral()?;
        let leg1 = SessionRequest {
            public_key: client_public,
            proof: Vec::new(),
        }
        .encode()?;
        debug!("handshake leg 1: sending client public key");
        let reply = self.request(&endpoint, leg1, timeout).await?;
        let leg1_reply = SessionResponse::decode(&reply.payload)?;

        let handshake =
            srp.compute_session_key(&leg1_reply.server_public_key, &leg1_reply.salt)?;

        // Leg two: send M1, receive M2.
        let leg2 = SessionRequest {
            public_key: Vec::new(),
            proof: handshake.client_proof.to_vec(),
        }
        .encode()?;
        debug!("handshake leg 2: sending client proof");
        let reply = self.request(&endpoint, leg2, timeout).await?;
        let leg2_reply = SessionResponse::decode(&reply.payload)?;

        if !srp.verify_server_proof(&leg2_reply.server_proof) {
            warn!("server proof rejected");
            return Err(SecurityError::ProofMismatch.into());
        }
        Ok(handshake.session_key)
    }

    /// Ask the connected device to scan for Wi-Fi networks. Requires an
    /// established session.
    pub async fn scan_wifi(
        &mut self,
        passive: bool,
    ) -> Result<Vec<WifiNetwork>, ProvisioningError> {
        if self.cipher.is_none() {
            return Err(ProtocolError::NotConnected.into());
        }
        self.set_phase(Phase::ScanningWifi);
        let endpoint = self.config.endpoints.scan.clone();
        let timeout = self.config.scan_timeout;
        let payload = WifiScanRequest { passive }.encode();
        let plain = match self.secure_request(&endpoint, &payload, timeout).await {
            Ok(p) => p,
            Err(e) => return Err(self.fail(e)),
        };
        let scan = match WifiScanResponse::decode(&plain) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(e.into())),
        };
        info!(count = scan.networks.len(), "wifi scan complete");
        self.session.networks = scan.networks.clone();
        self.set_phase(Phase::Idle);
        Ok(scan.networks)
    }

    /// Submit credentials, apply them, and poll until the device reports
    /// joining the network or gives up.
    pub async fn provision_wifi(
        &mut self,
        credentials: WifiCredentials,
    ) -> Result<(), ProvisioningError> {
        if self.cipher.is_none() {
            return Err(ProtocolError::NotConnected.into());
        }
        let endpoint = self.config.endpoints.config.clone();
        let timeout = self.config.request_timeout;

        self.set_phase(Phase::SendingCredentials);
        info!(ssid = %String::from_utf8_lossy(&credentials.ssid), "sending wifi credentials");
        let config = WifiConfigRequest {
            ssid: credentials.ssid,
            password: credentials.password,
        };
        let payload = match config.encode() {
            Ok(p) => p,
            Err(e) => return Err(self.fail(e.into())),
        };
        if let Err(e) = self.secure_request(&endpoint, &payload, timeout).await {
            return Err(self.fail(e));
        }

        self.set_phase(Phase::ApplyingConfig);
        if let Err(e) = self
            .secure_request(&endpoint, &[CMD_APPLY_CONFIG], timeout)
            .await
        {
            return Err(self.fail(e));
        }

        self.set_phase(Phase::Verifying);
        for attempt in 0..self.config.max_status_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.status_poll_interval).await;
            }
            let status = match self.query_status().await {
                Ok(s) => s,
                Err(e) => return Err(self.fail(e)),
            };
            match status.status {
                ProvisioningStatus::InProgress => {
                    debug!(attempt, "association still in progress");
                }
                ProvisioningStatus::Success => {
                    self.set_phase(Phase::Success);
                    info!("device joined the network");
                    return Ok(());
                }
                ProvisioningStatus::Failed(reason) => {
                    let err = ProvisioningError::from(WifiProvisioningError::from(reason));
                    return Err(self.fail(err));
                }
            }
        }
        Err(self.fail(ProvisioningError::Timeout))
    }

    /// One-shot status query. Requires an established session.
    pub async fn get_status(&mut self) -> Result<StatusResponse, ProvisioningError> {
        if self.cipher.is_none() {
            return Err(ProtocolError::NotConnected.into());
        }
        self.query_status().await
    }

    async fn query_status(&mut self) -> Result<StatusResponse, ProvisioningError> {
        let endpoint = self.config.endpoints.config.clone();
        let timeout = self.config.request_timeout;
        let plain = self
            .secure_request(&endpoint, &[CMD_GET_STATUS], timeout)
            .await?;
        Ok(StatusResponse::decode(&plain)?)
    }

    /// Deliver application-defined key/value data. Ciphered when a session
    /// exists, plaintext otherwise.
    pub async fn send_custom_data(
        &mut self,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<(), ProvisioningError> {
        if self.session.device.is_none() {
            return Err(ProtocolError::NotConnected.into());
        }
        let endpoint = self.config.endpoints.custom.clone();
        let timeout = self.config.request_timeout;
        let payload = CustomDataRequest { entries }.encode()?;
        if self.cipher.is_some() {
            self.secure_request(&endpoint, &payload, timeout).await?;
        } else {
            self.request(&endpoint, payload, timeout).await?;
        }
        Ok(())
    }

    /// Close the channel and clear all session state, including the cipher
    /// key.
    pub async fn disconnect(&mut self) -> Result<(), ProvisioningError> {
        let result = self.transport.disconnect().await;
        self.reset();
        result.map_err(ProvisioningError::from)
    }

    /// Clear session state without touching the transport. Dropping the
    /// cipher zeroizes the session key.
    pub fn reset(&mut self) {
        self.cipher = None;
        self.session = ProvisioningSession::new();
        self.request_in_flight = false;
        self.set_phase(Phase::Idle);
    }

    /// Release the transport's platform resources.
    pub async fn dispose(&mut self) {
        self.transport.dispose().await;
        self.reset();
    }

    /// One ciphered exchange: encrypts the payload, unwraps and decrypts
    /// the response payload. An empty response payload stays empty; some
    /// requests carry no reply body.
    async fn secure_request(
        &mut self,
        endpoint: &str,
        plaintext: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ProvisioningError> {
        let cipher = self.cipher.as_ref().ok_or(ProtocolError::NotConnected)?;
        let payload = cipher.encrypt(plaintext)?.to_wire();
        let response = self.request(endpoint, payload, timeout).await?;
        let cipher = self.cipher.as_ref().ok_or(ProtocolError::NotConnected)?;
        if response.payload.is_empty() {
            return Ok(Vec::new());
        }
        Ok(cipher.decrypt_wire(&response.payload)?)
    }

    /// One plaintext request/response exchange. Serialized: the in-flight
    /// slot is released on every exit path, timeout included.
    async fn request(
        &mut self,
        endpoint: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Response, ProvisioningError> {
        if self.request_in_flight {
            return Err(ProtocolError::RequestInFlight.into());
        }
        let frame = Request {
            endpoint: endpoint.to_owned(),
            payload,
        }
        .encode()?;
        self.request_in_flight = true;
        let result = self.exchange(&frame, timeout).await;
        self.request_in_flight = false;
        result
    }

    async fn exchange(
        &mut self,
        frame: &[u8],
        timeout: Duration,
    ) -> Result<Response, ProvisioningError> {
        let deadline = Instant::now() + timeout;
        self.transport.send(frame).await?;
        let reply = self.wait_for_frame(deadline).await?;
        let response = Response::decode(&reply)?;
        if !response.is_success() {
            debug!(status = response.status, "peer rejected request");
            return Err(ProtocolError::RequestFailed(response.status).into());
        }
        Ok(response)
    }

    /// Wait for the next frame, skipping advertisements that raced the
    /// request.
    async fn wait_for_frame(&mut self, deadline: Instant) -> Result<Vec<u8>, ProvisioningError> {
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Err(_) => return Err(ProvisioningError::Timeout),
                Ok(None) => return Err(TransportError::Disconnected.into()),
                Ok(Some(TransportEvent::Frame(frame))) => return Ok(frame),
                Ok(Some(TransportEvent::Disconnected)) => {
                    return Err(TransportError::Disconnected.into())
                }
                Ok(Some(TransportEvent::Advertisement(_))) => continue,
            }
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.session.phase == phase {
            return;
        }
        self.session.phase = phase;
        debug!(?phase, "phase changed");
        for observer in &self.observers {
            observer.on_phase_changed(phase);
        }
    }

    /// Record a failure in the session and notify observers; returns the
    /// error for `return Err(self.fail(e))` call sites.
    fn fail(&mut self, error: ProvisioningError) -> ProvisioningError {
        warn!(%error, recoverable = error.is_recoverable(), "operation failed");
        self.session.last_error = Some(error.clone());
        self.set_phase(Phase::Failure);
        for observer in &self.observers {
            observer.on_error(&error);
        }
        error
    }
}

/// An in-progress device scan borrowed from the engine.
///
/// Dropping the scan returns the session to idle but cannot stop the
/// transport's discovery; call [`stop`](Self::stop) for a clean shutdown.
pub struct DeviceScan<'a, T: Transport> {
    engine: &'a mut ProvisioningEngine<T>,
    /// End of the scan window, fixed when the scan started.
    deadline: Instant,
    seen: HashSet<String>,
    devices: Vec<ProvisioningDevice>,
    stopped: bool,
}

impl<T: Transport> DeviceScan<'_, T> {
    /// Wait for the next distinct device. Returns `Ok(None)` once the scan
    /// window closes, no matter how many advertisements are still arriving;
    /// repeated advertisements of a known device are skipped.
    pub async fn next(&mut self) -> Result<Option<ProvisioningDevice>, ProvisioningError> {
        loop {
            match tokio::time::timeout_at(self.deadline, self.engine.events.recv()).await {
                Err(_) => return Ok(None),
                Ok(None) => return Err(TransportError::Disconnected.into()),
                Ok(Some(TransportEvent::Advertisement(device))) => {
                    if !self.seen.insert(device.id.clone()) {
                        continue;
                    }
                    debug!(device = %device.id, rssi = ?device.rssi, "device discovered");
                    self.devices.push(device.clone());
                    for observer in &self.engine.observers {
                        observer.on_devices_updated(&self.devices);
                    }
                    return Ok(Some(device));
                }
                Ok(Some(_)) => continue,
            }
        }
    }

    /// All distinct devices seen so far, in discovery order.
    pub fn devices(&self) -> &[ProvisioningDevice] {
        &self.devices
    }

    /// Stop discovery and return the session to idle.
    pub async fn stop(mut self) -> Result<(), ProvisioningError> {
        self.stopped = true;
        self.engine.transport.stop_discovery().await?;
        self.engine.set_phase(Phase::Idle);
        Ok(())
    }
}

impl<T: Transport> Drop for DeviceScan<'_, T> {
    fn drop(&mut self) {
        if !self.stopped {
            self.engine.set_phase(Phase::Idle);
        }
    }
}
