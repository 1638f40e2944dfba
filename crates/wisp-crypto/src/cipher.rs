//! Per-message AES-CTR cipher keyed by the SRP session key.
//!
//! Every `encrypt` call draws a fresh 16-byte IV from the system CSPRNG;
//! the wire form is `iv || ciphertext`. The protocol carries no
//! authentication tag, so a successful decrypt only certifies structural
//! validity. Key mismatch and tampering are indistinguishable here, and
//! the provisioning engine treats any decrypt failure as a security
//! failure.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// IV length on the wire, bytes.
pub const IV_LEN: usize = 16;

/// Errors from the message cipher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    /// The wire blob is shorter than one IV.
    #[error("encrypted message too short to carry an IV")]
    Truncated,

    /// The system RNG failed to produce an IV.
    #[error("random generator failure")]
    RngFailure,
}

/// Wire-only representation of an encrypted payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedMessage {
    /// Per-message random IV.
    pub iv: [u8; IV_LEN],
    /// CTR-mode ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
    /// Serialize as `iv || ciphertext`.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse `iv || ciphertext`, checking the minimum length.
    pub fn from_wire(blob: &[u8]) -> Result<Self, CipherError> {
        if blob.len() < IV_LEN {
            return Err(CipherError::Truncated);
        }
        let (iv, ciphertext) = blob.split_at(IV_LEN);
        let mut iv_arr = [0u8; IV_LEN];
        iv_arr.copy_from_slice(iv);
        Ok(Self {
            iv: iv_arr,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Symmetric cipher for one authenticated session.
///
/// Constructed only after the server proof verifies; dropped (and the key
/// zeroized) on disconnect or reset.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MessageCipher {
    key: [u8; 32],
}

impl MessageCipher {
    /// Key the cipher with the 32-byte SRP session key.
    pub fn new(session_key: [u8; 32]) -> Self {
        Self { key: session_key }
    }

    /// Encrypt a payload under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedMessage, CipherError> {
        let mut iv = [0u8; IV_LEN];
        getrandom::getrandom(&mut iv).map_err(|_| CipherError::RngFailure)?;
        let mut ciphertext = plaintext.to_vec();
        self.apply_keystream(&iv, &mut ciphertext);
        Ok(EncryptedMessage { iv, ciphertext })
    }

    /// Decrypt a structurally valid message.
    ///
    /// CTR mode cannot fail here; any garbage produced by a wrong key is
    /// caught later when the payload fails to decode.
    pub fn decrypt(&self, message: &EncryptedMessage) -> Vec<u8> {
        let mut plaintext = message.ciphertext.clone();
        self.apply_keystream(&message.iv, &mut plaintext);
        plaintext
    }

    /// Parse and decrypt a wire blob in one step.
    pub fn decrypt_wire(&self, blob: &[u8]) -> Result<Vec<u8>, CipherError> {
        let message = EncryptedMessage::from_wire(blob)?;
        Ok(self.decrypt(&message))
    }

    fn apply_keystream(&self, iv: &[u8; IV_LEN], buf: &mut [u8]) {
        let mut ctr = Aes256Ctr::new(&self.key.into(), iv.into());
        ctr.apply_keystream(buf);
    }
}
