//! Client side of the SRP6a password-authenticated key exchange.
//!
//! The peer proves knowledge of the proof-of-possession secret without it
//! ever crossing the wire. Parameters are fixed by the device firmware:
//! the RFC 5054 3072-bit group with generator 5 and SHA-256 as the hash
//! primitive.
//!
//! Byte conventions: every big integer is hashed as its minimal big-endian
//! encoding, except the group prime `N` which is hashed at its full
//! 384-byte width.

use num_bigint::BigUint;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// SRP identity used by every provisioning session.
///
/// The wire protocol carries no identity field, so this cannot vary per
/// deployment; the device firmware hard-codes the same constant.
pub const SRP_IDENTITY: &str = "wisp";

/// RFC 5054 3072-bit group prime, hex encoded.
pub const GROUP_PRIME_HEX: &str = "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33\
A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7\
ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864\
D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2\
08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF";

/// Group generator.
pub const GROUP_GENERATOR: u8 = 5;

/// Width of the group prime in bytes.
pub const GROUP_PRIME_LEN: usize = 384;

const PRIVATE_KEY_LEN: usize = 32;

/// Errors from the SRP6a handshake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SrpError {
    /// The server public key reduced to zero modulo N. Accepting it would
    /// let an active attacker force a known session key.
    #[error("server public key is invalid")]
    InvalidServerKey,

    /// A handshake step was invoked before its prerequisite completed.
    #[error("handshake step out of order")]
    OutOfOrder,

    /// The system RNG failed to produce a private exponent.
    #[error("random generator failure")]
    RngFailure,
}

/// Output of the key-exchange computation.
///
/// The session key is zeroized when the result is dropped; the engine
/// copies it into the cipher layer only after the server proof verifies.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HandshakeResult {
    /// SHA-256 of the shared secret; keys the message cipher.
    pub session_key: [u8; 32],
    /// Client public key `A`, minimal big-endian.
    pub client_public: Vec<u8>,
    /// Client proof `M1`, sent to the server for verification.
    pub client_proof: [u8; 32],
}

/// Client-side SRP6a state for one provisioning session.
///
/// Lifecycle: [`generate_client_ephemeral`](Self::generate_client_ephemeral)
/// → [`compute_session_key`](Self::compute_session_key) →
/// [`verify_server_proof`](Self::verify_server_proof). Dropping the client
/// zeroizes the password, the private exponent, and the session key.
pub struct SrpClient {
    identity: &'static str,
    password: String,
    private_key: Option<[u8; PRIVATE_KEY_LEN]>,
    client_public: Option<Vec<u8>>,
    session_key: Option<[u8; 32]>,
    client_proof: Option<[u8; 32]>,
    verified: bool,
}

impl SrpClient {
    /// Create a client for the fixed protocol identity and the
    /// operator-supplied proof-of-possession secret.
    pub fn new(proof_of_possession: &str) -> Self {
        Self {
            identity: SRP_IDENTITY,
            password: proof_of_possession.to_owned(),
            private_key: None,
            client_public: None,
            session_key: None,
            client_proof: None,
            verified: false,
        }
    }

    /// Generate the client ephemeral: a 256-bit private exponent `a` from
    /// the system CSPRNG and the public key `A = g^a mod N`.
    ///
    /// Returns `A` as minimal big-endian bytes.
    pub fn generate_client_ephemeral(&mut self) -> Result<Vec<u8>, SrpError> {
        let mut a = [0u8; PRIVATE_KEY_LEN];
        getrandom::getrandom(&mut a).map_err(|_| SrpError::RngFailure)?;
        if a.iter().all(|&b| b == 0) {
            // A zero exponent would yield A = 1; draw again.
            getrandom::getrandom(&mut a).map_err(|_| SrpError::RngFailure)?;
        }
        Ok(self.set_ephemeral(a))
    }

    fn set_ephemeral(&mut self, a: [u8; PRIVATE_KEY_LEN]) -> Vec<u8> {
        let n = group_prime();
        let g = BigUint::from(GROUP_GENERATOR);
        let public = g.modpow(&BigUint::from_bytes_be(&a), &n);
        let public_bytes = public.to_bytes_be();
        self.private_key = Some(a);
        self.client_public = Some(public_bytes.clone());
        public_bytes
    }

    /// Derive the shared session key and the client proof from the server
    /// public key `B` and the user salt.
    ///
    /// Rejects any `B` with `B mod N == 0` without mutating state; such a
    /// key collapses the shared secret and is the canonical SRP attack.
    pub fn compute_session_key(
        &mut self,
        server_public: &[u8],
        salt: &[u8],
    ) -> Result<HandshakeResult, SrpError> {
        let a_bytes = self.private_key.ok_or(SrpError::OutOfOrder)?;
        let client_public = self.client_public.clone().ok_or(SrpError::OutOfOrder)?;

        let n = group_prime();
        let g = BigUint::from(GROUP_GENERATOR);
        let b_pub = BigUint::from_bytes_be(server_public) % &n;
        if b_pub == BigUint::from(0u8) {
            return Err(SrpError::InvalidServerKey);
        }

        let n_bytes = n.to_bytes_be();
        let g_bytes = g.to_bytes_be();
        let b_bytes = b_pub.to_bytes_be();

        // k = H(N | g), u = H(A | B)
        let k = BigUint::from_bytes_be(&hash(&[&n_bytes, &g_bytes]));
        let u = BigUint::from_bytes_be(&hash(&[&client_public, &b_bytes]));

        // x = H(salt | H(identity ":" password))
        let inner = hash(&[self.identity.as_bytes(), b":", self.password.as_bytes()]);
        let x = BigUint::from_bytes_be(&hash(&[salt, &inner]));

        // S = (B - k * g^x) ^ (a + u * x) mod N
        let a = BigUint::from_bytes_be(&a_bytes);
        let kgx = (&k * g.modpow(&x, &n)) % &n;
        let base = (&b_pub + &n - kgx) % &n;
        let exponent = &a + &u * &x;
        let shared = base.modpow(&exponent, &n);

        let session_key = hash(&[&shared.to_bytes_be()]);

        // M1 = H(H(N) xor H(g) | H(identity) | salt | A | B | K)
        let hn = hash(&[&n_bytes]);
        let hg = hash(&[&g_bytes]);
        let mut hng = [0u8; 32];
        for (out, (p, q)) in hng.iter_mut().zip(hn.iter().zip(hg.iter())) {
            *out = p ^ q;
        }
        let hi = hash(&[self.identity.as_bytes()]);
        let client_proof = hash(&[&hng, &hi, salt, &client_public, &b_bytes, &session_key]);

        self.session_key = Some(session_key);
        self.client_proof = Some(client_proof);
        self.verified = false;

        Ok(HandshakeResult {
            session_key,
            client_public,
            client_proof,
        })
    }

    /// Verify the server proof `M2 = H(A | M1 | K)` in constant time.
    ///
    /// Returns `false` when the proof mismatches or when no session key has
    /// been computed yet. Only a `true` result marks the session as
    /// authenticated.
    pub fn verify_server_proof(&mut self, server_proof: &[u8]) -> bool {
        let (session_key, client_proof, client_public) = match (
            self.session_key.as_ref(),
            self.client_proof.as_ref(),
            self.client_public.as_ref(),
        ) {
            (Some(k), Some(m1), Some(a)) => (k, m1, a),
            _ => return false,
        };

        let expected = hash(&[client_public, client_proof, session_key]);
        let ok = constant_time_eq::constant_time_eq(server_proof, &expected);
        if ok {
            self.verified = true;
        }
        ok
    }

    /// Whether the server proof has been verified for this session.
    pub fn is_verified(&self) -> bool {
        self.verified
    }
}

impl Drop for SrpClient {
    fn drop(&mut self) {
        self.password.zeroize();
        if let Some(ref mut a) = self.private_key {
            a.zeroize();
        }
        if let Some(ref mut k) = self.session_key {
            k.zeroize();
        }
    }
}

impl std::fmt::Debug for HandshakeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeResult")
            .field("client_public", &self.client_public.len())
            .field("session_key", &"<redacted>")
            .field("client_proof", &"<redacted>")
            .finish()
    }
}

/// The group prime as a big integer.
pub fn group_prime() -> BigUint {
    BigUint::parse_bytes(GROUP_PRIME_HEX.as_bytes(), 16)
        .unwrap_or_else(|| unreachable!("group prime constant is valid hex"))
}

fn hash(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for part in parts {
        h.update(part);
    }
    h.finalize().into()
}
