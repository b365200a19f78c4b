//! On-wire formats for the HyQuery protocol family.
//!
//! Everything that crosses the UDP socket is encoded and decoded here:
//! the legacy V1 query format, the challenge-authenticated V2 format with
//! its TLV payloads and pagination, and the HMAC-signed status/ACK frames
//! exchanged between workers and primaries.
//!
//! All integers are little-endian unless a field explicitly says otherwise.
//! Strings are a `u16` byte length followed by UTF-8. UUIDs serialize as two
//! big-endian `u64`s, most significant half first.

pub mod error;
pub mod status;
pub mod v1;
pub mod v2;
pub mod wire;

pub use error::ProtocolError;
