//! Cryptographic primitives for WISP device provisioning.
//!
//! This crate implements the two pure-computation layers of the
//! provisioning protocol:
//! - [`srp`]: the client side of the SRP6a password-authenticated key
//!   exchange (RFC 5054 3072-bit group, SHA-256)
//! - [`cipher`]: the per-message AES-CTR cipher keyed by the negotiated
//!   session key
//!
//! Neither module has any transport awareness; the provisioning engine
//! drives them and owns their lifetimes.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod srp;
