//! Wire protocol for WISP device provisioning.
//!
//! Defines the message set exchanged with the embedded peer and the
//! big-endian, length-prefixed framing that carries it. All decoding is
//! bounds-checked; truncation never panics.

#![forbid(unsafe_code)]

pub mod codec;
pub mod messages;

pub use codec::{CodecError, FieldReader};
pub use messages::*;
