//! Packet classification on the shared game port.
//!
//! Every inbound datagram is classified by its first 8 bytes. Query-family
//! traffic is consumed here (answered or dropped); anything else must reach
//! the downstream game transport exactly as if no handler were installed.

use hyquery_protocol::status::{ACK_MAGIC, STATUS_MAGIC};
use hyquery_protocol::{v1, v2};

/// What a datagram's magic prefix says it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    /// `HYQUERY\0` — legacy query request.
    V1Query,
    /// `HYQUERY2` or `ONEQUERY` — challenge-authenticated query request.
    V2Query(v2::RequestFamily),
    /// `HYSTATUS` — worker status update.
    Status,
    /// A recognized query-family magic that is never accepted inbound
    /// (replies, ACKs). Dropped, never forwarded.
    OtherKnown,
    /// Not query-family traffic; hand it to the game transport untouched.
    Foreign,
}

/// Classify a datagram by magic prefix. Pure byte inspection; whether a
/// recognized packet is actually handled depends on the handler's
/// configuration (protocol toggles, role).
pub fn classify(data: &[u8]) -> PacketKind {
    if data.len() < 8 {
        return PacketKind::Foreign;
    }

    if data.starts_with(v1::REQUEST_MAGIC) {
        return PacketKind::V1Query;
    }
    if let Some(family) = v2::detect_request_family(data) {
        return PacketKind::V2Query(family);
    }
    if data.starts_with(STATUS_MAGIC) {
        return PacketKind::Status;
    }
    if data.starts_with(v1::RESPONSE_MAGIC)
        || data.starts_with(ACK_MAGIC)
        || v2::matches_any_response_magic(data)
    {
        return PacketKind::OtherKnown;
    }

    PacketKind::Foreign
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_request_prefix() {
        assert_eq!(classify(b"HYQUERY\0\x00"), PacketKind::V1Query);
        // Magic alone still classifies; the parser rejects it later.
        assert_eq!(classify(b"HYQUERY\0"), PacketKind::V1Query);
    }

    #[test]
    fn v2_request_prefixes() {
        assert_eq!(
            classify(b"ONEQUERY\x00"),
            PacketKind::V2Query(v2::RequestFamily::OneQuery)
        );
        assert_eq!(
            classify(b"HYQUERY2\x01rest"),
            PacketKind::V2Query(v2::RequestFamily::HyQuery2)
        );
    }

    #[test]
    fn status_prefix() {
        assert_eq!(classify(b"HYSTATUS\x01more-bytes"), PacketKind::Status);
    }

    #[test]
    fn reply_magics_are_known_but_not_accepted() {
        assert_eq!(classify(b"HYREPLY\0\x00"), PacketKind::OtherKnown);
        assert_eq!(classify(b"HYREPLY2\x01"), PacketKind::OtherKnown);
        assert_eq!(classify(b"ONEREPLY\x00"), PacketKind::OtherKnown);
        assert_eq!(classify(b"HYSTATOK\x00"), PacketKind::OtherKnown);
    }

    #[test]
    fn foreign_traffic_forwards() {
        assert_eq!(classify(b"\x00\x01\x02\x03\x04\x05\x06\x07"), PacketKind::Foreign);
        assert_eq!(classify(b"GET / HTTP/1.1"), PacketKind::Foreign);
        assert_eq!(classify(b""), PacketKind::Foreign);
        // Shorter than a full magic: forward, even if it shares a prefix.
        assert_eq!(classify(b"HYQUERY"), PacketKind::Foreign);
    }
}
