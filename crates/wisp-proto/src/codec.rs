//! Big-endian, length-prefixed framing for the provisioning message set.
//!
//! Every variable-length field is prefixed by a one- or two-byte length
//! and checked against the remaining input on decode; truncated frames
//! decode to [`CodecError::Truncated`], never a panic.

use bytes::BufMut;

use crate::messages::*;

/// Framing error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("frame truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("field too long: {len} bytes (max {max})")]
    FieldTooLong { len: usize, max: usize },

    #[error("unknown auth mode byte: {0}")]
    UnknownAuthMode(u8),

    #[error("unknown status state byte: {0}")]
    UnknownState(u8),

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),
}

/// Bounds-checked cursor over a received frame.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let bytes = self.take(1)?;
        Ok(bytes[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a field whose length is a one-byte prefix.
    pub fn read_short_field(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_u8()? as usize;
        self.take(len)
    }

    /// Read a field whose length is a two-byte big-endian prefix.
    pub fn read_field(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_u16()? as usize;
        self.take(len)
    }

    /// Require the frame to be fully consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(CodecError::TrailingBytes(extra)),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::Truncated {
                needed: len - self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }
}

fn put_short_field(out: &mut Vec<u8>, field: &[u8]) -> Result<(), CodecError> {
    if field.len() > u8::MAX as usize {
        return Err(CodecError::FieldTooLong {
            len: field.len(),
            max: u8::MAX as usize,
        });
    }
    out.put_u8(field.len() as u8);
    out.extend_from_slice(field);
    Ok(())
}

fn put_field(out: &mut Vec<u8>, field: &[u8]) -> Result<(), CodecError> {
    if field.len() > u16::MAX as usize {
        return Err(CodecError::FieldTooLong {
            len: field.len(),
            max: u16::MAX as usize,
        });
    }
    out.put_u16(field.len() as u16);
    out.extend_from_slice(field);
    Ok(())
}

impl Request {
    /// `[endpoint len:1][endpoint][payload len:2][payload]`
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(3 + self.endpoint.len() + self.payload.len());
        put_short_field(&mut out, self.endpoint.as_bytes())?;
        put_field(&mut out, &self.payload)?;
        Ok(out)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut r = FieldReader::new(frame);
        let endpoint = String::from_utf8_lossy(r.read_short_field()?).into_owned();
        let payload = r.read_field()?.to_vec();
        r.finish()?;
        Ok(Self { endpoint, payload })
    }
}

impl Response {
    /// `[status:1][payload len:2][payload]`
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(3 + self.payload.len());
        out.put_u8(self.status);
        put_field(&mut out, &self.payload)?;
        Ok(out)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut r = FieldReader::new(frame);
        let status = r.read_u8()?;
        let payload = r.read_field()?.to_vec();
        r.finish()?;
        Ok(Self { status, payload })
    }
}

impl SessionRequest {
    /// `[pubkey len:2][pubkey][proof len:2][proof]`
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(4 + self.public_key.len() + self.proof.len());
        put_field(&mut out, &self.public_key)?;
        put_field(&mut out, &self.proof)?;
        Ok(out)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut r = FieldReader::new(frame);
        let public_key = r.read_field()?.to_vec();
        let proof = r.read_field()?.to_vec();
        r.finish()?;
        Ok(Self { public_key, proof })
    }
}

impl SessionResponse {
    /// `[server-pubkey len:2][..][server-proof len:2][..][salt len:2][..]`
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        put_field(&mut out, &self.server_public_key)?;
        put_field(&mut out, &self.server_proof)?;
        put_field(&mut out, &self.salt)?;
        Ok(out)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut r = FieldReader::new(frame);
        let server_public_key = r.read_field()?.to_vec();
        let server_proof = r.read_field()?.to_vec();
        let salt = r.read_field()?.to_vec();
        r.finish()?;
        Ok(Self {
            server_public_key,
            server_proof,
            salt,
        })
    }
}

impl WifiScanRequest {
    /// `[passive:1]`
    pub fn encode(&self) -> Vec<u8> {
        vec![u8::from(self.passive)]
    }

    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut r = FieldReader::new(frame);
        let passive = r.read_u8()? != 0;
        r.finish()?;
        Ok(Self { passive })
    }
}

impl WifiScanResponse {
    /// `[count:1]` then per entry
    /// `[ssid len:1][ssid][rssi:1 signed][channel:1][auth-mode:1]`
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.networks.len() > u8::MAX as usize {
            return Err(CodecError::FieldTooLong {
                len: self.networks.len(),
                max: u8::MAX as usize,
            });
        }
        let mut out = Vec::new();
        out.put_u8(self.networks.len() as u8);
        for network in &self.networks {
            put_short_field(&mut out, &network.ssid)?;
            out.put_i8(network.rssi);
            out.put_u8(network.channel);
            out.put_u8(network.auth_mode.to_wire());
        }
        Ok(out)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut r = FieldReader::new(frame);
        let count = r.read_u8()? as usize;
        let mut networks = Vec::with_capacity(count);
        for _ in 0..count {
            let ssid = r.read_short_field()?.to_vec();
            let rssi = r.read_i8()?;
            let channel = r.read_u8()?;
            let auth_byte = r.read_u8()?;
            let auth_mode =
                WifiAuthMode::from_wire(auth_byte).ok_or(CodecError::UnknownAuthMode(auth_byte))?;
            networks.push(WifiNetwork {
                ssid,
                rssi,
                channel,
                auth_mode,
            });
        }
        r.finish()?;
        Ok(Self { networks })
    }
}

impl WifiConfigRequest {
    /// `[ssid len:1][ssid][password len:1][password]`
    ///
    /// The SSID is carried byte-for-byte; only the password is text.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(2 + self.ssid.len() + self.password.len());
        put_short_field(&mut out, &self.ssid)?;
        put_short_field(&mut out, self.password.as_bytes())?;
        Ok(out)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut r = FieldReader::new(frame);
        let ssid = r.read_short_field()?.to_vec();
        let password = String::from_utf8_lossy(r.read_short_field()?).into_owned();
        r.finish()?;
        Ok(Self { ssid, password })
    }
}

impl StatusResponse {
    /// `[state:1][failure-reason:1 optional]`; 0 in-progress, 1 success,
    /// 2 failed.
    pub fn encode(&self) -> Vec<u8> {
        match self.status {
            ProvisioningStatus::InProgress => vec![0],
            ProvisioningStatus::Success => vec![1],
            ProvisioningStatus::Failed(reason) => vec![2, reason.to_wire()],
        }
    }

    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut r = FieldReader::new(frame);
        let status = match r.read_u8()? {
            0 => ProvisioningStatus::InProgress,
            1 => ProvisioningStatus::Success,
            2 => {
                // Older firmware omits the reason byte.
                let reason = if r.remaining() > 0 {
                    FailureReason::from_wire(r.read_u8()?)
                } else {
                    FailureReason::Unknown(0xFF)
                };
                ProvisioningStatus::Failed(reason)
            }
            other => return Err(CodecError::UnknownState(other)),
        };
        r.finish()?;
        Ok(Self { status })
    }
}

impl CustomDataRequest {
    /// `[count:1]` then per entry `[key len:1][key][value len:2][value]`
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.entries.len() > u8::MAX as usize {
            return Err(CodecError::FieldTooLong {
                len: self.entries.len(),
                max: u8::MAX as usize,
            });
        }
        let mut out = Vec::new();
        out.put_u8(self.entries.len() as u8);
        for (key, value) in &self.entries {
            put_short_field(&mut out, key.as_bytes())?;
            put_field(&mut out, value)?;
        }
        Ok(out)
    }

    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let mut r = FieldReader::new(frame);
        let count = r.read_u8()? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = String::from_utf8_lossy(r.read_short_field()?).into_owned();
            let value = r.read_field()?.to_vec();
            entries.push((key, value));
        }
        r.finish()?;
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn request_round_trip() {
        let msg = Request {
            endpoint: "prov-session".into(),
            payload: vec![1, 2, 3],
        };
        assert_eq!(Request::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn request_endpoint_max_length() {
        let msg = Request {
            endpoint: "e".repeat(255),
            payload: Vec::new(),
        };
        assert_eq!(Request::decode(&msg.encode().unwrap()).unwrap(), msg);

        let too_long = Request {
            endpoint: "e".repeat(256),
            payload: Vec::new(),
        };
        assert!(matches!(
            too_long.encode(),
            Err(CodecError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn truncated_request_rejected() {
        let encoded = Request {
            endpoint: "scan".into(),
            payload: vec![7; 32],
        }
        .encode()
        .unwrap();
        for cut in 0..encoded.len() {
            assert!(matches!(
                Request::decode(&encoded[..cut]),
                Err(CodecError::Truncated { .. })
            ));
        }
    }

    #[test]
    fn response_round_trip_and_status() {
        let ok = Response {
            status: Response::STATUS_SUCCESS,
            payload: b"body".to_vec(),
        };
        assert!(ok.is_success());
        assert_eq!(Response::decode(&ok.encode().unwrap()).unwrap(), ok);

        let failed = Response {
            status: 4,
            payload: Vec::new(),
        };
        assert!(!failed.is_success());
    }

    #[test]
    fn session_messages_round_trip_with_empty_legs() {
        // First leg: public key only. Second leg: proof only.
        let first = SessionRequest {
            public_key: vec![0xAB; 384],
            proof: Vec::new(),
        };
        assert_eq!(SessionRequest::decode(&first.encode().unwrap()).unwrap(), first);

        let second = SessionResponse {
            server_public_key: Vec::new(),
            server_proof: vec![0xCD; 32],
            salt: Vec::new(),
        };
        assert_eq!(
            SessionResponse::decode(&second.encode().unwrap()).unwrap(),
            second
        );
    }

    #[test]
    fn scan_response_empty_and_full() {
        let empty = WifiScanResponse { networks: Vec::new() };
        assert_eq!(
            WifiScanResponse::decode(&empty.encode().unwrap()).unwrap(),
            empty
        );

        let networks = (0..255)
            .map(|i| WifiNetwork {
                ssid: format!("net-{i}").into_bytes(),
                rssi: -(i as i16 % 90) as i8,
                channel: (i % 13) as u8 + 1,
                auth_mode: WifiAuthMode::from_wire((i % 8) as u8).unwrap(),
            })
            .collect::<Vec<_>>();
        let full = WifiScanResponse { networks };
        assert_eq!(full.networks.len(), 255);
        assert_eq!(
            WifiScanResponse::decode(&full.encode().unwrap()).unwrap(),
            full
        );
    }

    #[test]
    fn scan_response_unknown_auth_mode_rejected() {
        let frame = [1u8, 2, b'a', b'b', 0xC5, 6, 9];
        assert_eq!(
            WifiScanResponse::decode(&frame),
            Err(CodecError::UnknownAuthMode(9))
        );
    }

    #[test]
    fn wifi_config_zero_length_fields() {
        let msg = WifiConfigRequest {
            ssid: Vec::new(),
            password: String::new(),
        };
        let encoded = msg.encode().unwrap();
        assert_eq!(encoded, vec![0, 0]);
        let decoded = WifiConfigRequest::decode(&encoded).unwrap();
        assert!(decoded.ssid.is_empty() && decoded.password.is_empty());
    }

    #[test]
    fn wifi_config_max_length_fields() {
        let msg = WifiConfigRequest {
            ssid: vec![b's'; 255],
            password: "p".repeat(255),
        };
        let decoded = WifiConfigRequest::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.ssid.len(), 255);
        assert_eq!(decoded.password.len(), 255);
    }

    #[test]
    fn non_utf8_ssid_round_trips_byte_exact() {
        // Real access points broadcast SSIDs that are not valid UTF-8;
        // they must survive scan decode and config encode unmodified.
        let ssid = vec![0xC3, 0x28, 0x41, 0x42];

        let scan = WifiScanResponse {
            networks: vec![WifiNetwork {
                ssid: ssid.clone(),
                rssi: -55,
                channel: 3,
                auth_mode: WifiAuthMode::Wpa2Psk,
            }],
        };
        let decoded = WifiScanResponse::decode(&scan.encode().unwrap()).unwrap();
        assert_eq!(decoded.networks[0].ssid, ssid);

        let config = WifiConfigRequest {
            ssid: decoded.networks[0].ssid.clone(),
            password: "pw".into(),
        };
        let decoded = WifiConfigRequest::decode(&config.encode().unwrap()).unwrap();
        assert_eq!(decoded.ssid, ssid);
    }

    #[test]
    fn status_response_variants() {
        for status in [
            ProvisioningStatus::InProgress,
            ProvisioningStatus::Success,
            ProvisioningStatus::Failed(FailureReason::AuthFailed),
            ProvisioningStatus::Failed(FailureReason::NetworkNotFound),
            ProvisioningStatus::Failed(FailureReason::Unknown(0x7E)),
        ] {
            let msg = StatusResponse { status };
            assert_eq!(StatusResponse::decode(&msg.encode()).unwrap(), msg);
        }

        // Failed state with no reason byte still decodes.
        let decoded = StatusResponse::decode(&[2]).unwrap();
        assert_eq!(
            decoded.status,
            ProvisioningStatus::Failed(FailureReason::Unknown(0xFF))
        );

        assert_eq!(StatusResponse::decode(&[9]), Err(CodecError::UnknownState(9)));
    }

    #[test]
    fn custom_data_round_trip() {
        let msg = CustomDataRequest {
            entries: vec![
                ("hostname".into(), b"sensor-7".to_vec()),
                ("empty".into(), Vec::new()),
            ],
        };
        assert_eq!(CustomDataRequest::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut encoded = WifiScanRequest { passive: true }.encode();
        encoded.push(0xEE);
        assert_eq!(
            WifiScanRequest::decode(&encoded),
            Err(CodecError::TrailingBytes(1))
        );
    }

    proptest! {
        #[test]
        fn prop_request_round_trip(
            endpoint in "[a-z-]{0,255}",
            payload in prop::collection::vec(any::<u8>(), 0..1024),
        ) {
            let msg = Request { endpoint, payload };
            let decoded = Request::decode(&msg.encode().unwrap()).unwrap();
            prop_assert_eq!(msg, decoded);
        }

        #[test]
        fn prop_response_round_trip(
            status in any::<u8>(),
            payload in prop::collection::vec(any::<u8>(), 0..1024),
        ) {
            let msg = Response { status, payload };
            let decoded = Response::decode(&msg.encode().unwrap()).unwrap();
            prop_assert_eq!(msg, decoded);
        }
    }
}
