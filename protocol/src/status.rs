//! Worker→primary status frames and the signed ACKs they elicit.
//!
//! The status HMAC is computed over `magic ‖ version ‖ timestamp ‖ payload`
//! with the HMAC field absent, then transmitted *between* the timestamp and
//! the payload. Receivers must excise the HMAC bytes before recomputing.
//! This layout is part of the wire contract; do not reorder it.

use hyquery_types::Player;

use crate::error::ProtocolError;
use crate::wire::{self, HMAC_LENGTH};

pub const STATUS_MAGIC: &[u8; 8] = b"HYSTATUS";
pub const ACK_MAGIC: &[u8; 8] = b"HYSTATOK";

pub const PROTOCOL_VERSION: u8 = 0x01;

pub const ACK_OK: u8 = 0x00;
pub const ACK_UNKNOWN_ID: u8 = 0x01;
pub const ACK_BAD_HMAC: u8 = 0x02;
pub const ACK_STALE: u8 = 0x03;

/// Magic + version + timestamp, i.e. everything before the HMAC.
const STATUS_PREFIX_LEN: usize = 8 + 1 + 8;
const MIN_STATUS_SIZE: usize = STATUS_PREFIX_LEN + HMAC_LENGTH;
const ACK_PREFIX_LEN: usize = 8 + 1 + 8;

/// A parsed worker status packet. The HMAC is verified separately via
/// [`verify_status_hmac`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusPacket {
    pub worker_id: String,
    pub server_name: String,
    pub motd: String,
    pub online_players: i32,
    pub max_players: i32,
    pub port: i32,
    pub version: String,
    pub players: Vec<Player>,
    pub timestamp_millis: i64,
}

/// A parsed primary→worker acknowledgment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckPacket {
    pub status: u8,
    pub timestamp_millis: i64,
}

/// Whether the datagram is long enough to be a status packet and carries the
/// status magic.
pub fn is_status_packet(data: &[u8]) -> bool {
    data.len() >= MIN_STATUS_SIZE && data.starts_with(STATUS_MAGIC)
}

fn put_status_payload(buf: &mut Vec<u8>, packet: &StatusPacket) {
    wire::put_string(buf, &packet.worker_id);
    wire::put_string(buf, &packet.server_name);
    wire::put_string(buf, &packet.motd);
    buf.extend_from_slice(&packet.online_players.to_le_bytes());
    buf.extend_from_slice(&packet.max_players.to_le_bytes());
    buf.extend_from_slice(&packet.port.to_le_bytes());
    wire::put_string(buf, &packet.version);
    buf.extend_from_slice(&(packet.players.len() as i32).to_le_bytes());
    for player in &packet.players {
        wire::put_string(buf, &player.username);
        wire::put_uuid(buf, &player.uuid);
    }
}

/// Build and sign a status packet with the worker's shared key.
pub fn build_status_packet(packet: &StatusPacket, key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(STATUS_PREFIX_LEN);
    prefix.extend_from_slice(STATUS_MAGIC);
    prefix.push(PROTOCOL_VERSION);
    prefix.extend_from_slice(&packet.timestamp_millis.to_le_bytes());

    let mut payload = Vec::new();
    put_status_payload(&mut payload, packet);

    let mut signed = Vec::with_capacity(prefix.len() + payload.len());
    signed.extend_from_slice(&prefix);
    signed.extend_from_slice(&payload);
    let hmac = wire::hmac_sha256(key.as_bytes(), &signed);

    let mut buf = Vec::with_capacity(prefix.len() + HMAC_LENGTH + payload.len());
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(&hmac);
    buf.extend_from_slice(&payload);
    buf
}

/// Parse a status packet, skipping (not verifying) the HMAC field.
pub fn parse_status_packet(data: &[u8]) -> Result<StatusPacket, ProtocolError> {
    if !data.starts_with(STATUS_MAGIC) {
        return Err(ProtocolError::BadMagic);
    }
    let mut rest = &data[STATUS_MAGIC.len()..];

    let version = wire::get_u8(&mut rest)?;
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let timestamp_millis = wire::get_i64_le(&mut rest)?;
    wire::get_bytes(&mut rest, HMAC_LENGTH)?;

    let worker_id = wire::get_string(&mut rest)?;
    let server_name = wire::get_string(&mut rest)?;
    let motd = wire::get_string(&mut rest)?;
    let online_players = wire::get_i32_le(&mut rest)?;
    let max_players = wire::get_i32_le(&mut rest)?;
    let port = wire::get_i32_le(&mut rest)?;
    let version = wire::get_string(&mut rest)?;

    let player_count = wire::get_i32_le(&mut rest)?;
    if player_count < 0 {
        return Err(ProtocolError::Malformed("negative player count".into()));
    }
    let mut players = Vec::with_capacity(player_count.min(4096) as usize);
    for _ in 0..player_count {
        let username = wire::get_string(&mut rest)?;
        let uuid = wire::get_uuid(&mut rest)?;
        players.push(Player::new(username, uuid));
    }

    Ok(StatusPacket {
        worker_id,
        server_name,
        motd,
        online_players,
        max_players,
        port,
        version,
        players,
        timestamp_millis,
    })
}

/// Verify a status packet's HMAC against a shared key.
///
/// Reconstructs the signed byte sequence by excising the HMAC field, then
/// compares in constant time.
pub fn verify_status_hmac(data: &[u8], key: &str) -> bool {
    if data.len() < MIN_STATUS_SIZE {
        return false;
    }

    let received = &data[STATUS_PREFIX_LEN..STATUS_PREFIX_LEN + HMAC_LENGTH];

    let mut signed = Vec::with_capacity(data.len() - HMAC_LENGTH);
    signed.extend_from_slice(&data[..STATUS_PREFIX_LEN]);
    signed.extend_from_slice(&data[STATUS_PREFIX_LEN + HMAC_LENGTH..]);

    let expected = wire::hmac_sha256(key.as_bytes(), &signed);
    wire::constant_time_eq(received, &expected)
}

/// Build a signed acknowledgment echoing the status packet's timestamp.
pub fn build_ack_packet(status: u8, timestamp_millis: i64, key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ACK_PREFIX_LEN + HMAC_LENGTH);
    buf.extend_from_slice(ACK_MAGIC);
    buf.push(status);
    buf.extend_from_slice(&timestamp_millis.to_le_bytes());
    let hmac = wire::hmac_sha256(key.as_bytes(), &buf);
    buf.extend_from_slice(&hmac);
    buf
}

/// Parse an acknowledgment packet.
pub fn parse_ack_packet(data: &[u8]) -> Result<AckPacket, ProtocolError> {
    if !data.starts_with(ACK_MAGIC) {
        return Err(ProtocolError::BadMagic);
    }
    let mut rest = &data[ACK_MAGIC.len()..];
    let status = wire::get_u8(&mut rest)?;
    let timestamp_millis = wire::get_i64_le(&mut rest)?;
    wire::get_bytes(&mut rest, HMAC_LENGTH)?;
    Ok(AckPacket {
        status,
        timestamp_millis,
    })
}

/// Verify an acknowledgment's HMAC (computed over everything before it).
pub fn verify_ack_hmac(data: &[u8], key: &str) -> bool {
    if data.len() < ACK_PREFIX_LEN + HMAC_LENGTH {
        return false;
    }
    let received = &data[ACK_PREFIX_LEN..ACK_PREFIX_LEN + HMAC_LENGTH];
    let expected = wire::hmac_sha256(key.as_bytes(), &data[..ACK_PREFIX_LEN]);
    wire::constant_time_eq(received, &expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_packet() -> StatusPacket {
        StatusPacket {
            worker_id: "game-1".into(),
            server_name: "Game 1".into(),
            motd: "mini games".into(),
            online_players: 7,
            max_players: 60,
            port: 5521,
            version: "1.4".into(),
            players: vec![
                Player::new("alice", Uuid::from_u128(1)),
                Player::new("bob", Uuid::from_u128(2)),
            ],
            timestamp_millis: 1_700_000_000_000,
        }
    }

    #[test]
    fn status_round_trip_preserves_all_fields() {
        let packet = sample_packet();
        let bytes = build_status_packet(&packet, "shared-key");
        assert!(is_status_packet(&bytes));
        assert_eq!(parse_status_packet(&bytes).unwrap(), packet);
    }

    #[test]
    fn hmac_verifies_with_correct_key_only() {
        let bytes = build_status_packet(&sample_packet(), "shared-key");
        assert!(verify_status_hmac(&bytes, "shared-key"));
        assert!(!verify_status_hmac(&bytes, "wrong-key"));
    }

    #[test]
    fn tampered_payload_fails_hmac() {
        let mut bytes = build_status_packet(&sample_packet(), "shared-key");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(!verify_status_hmac(&bytes, "shared-key"));
    }

    #[test]
    fn tampered_timestamp_fails_hmac() {
        let mut bytes = build_status_packet(&sample_packet(), "shared-key");
        bytes[9] ^= 0x01;
        assert!(!verify_status_hmac(&bytes, "shared-key"));
    }

    #[test]
    fn hmac_sits_between_timestamp_and_payload() {
        let packet = sample_packet();
        let bytes = build_status_packet(&packet, "shared-key");

        // Rebuild the signed sequence by hand and confirm the transmitted
        // HMAC location matches the excised layout.
        let mut signed = Vec::new();
        signed.extend_from_slice(&bytes[..STATUS_PREFIX_LEN]);
        signed.extend_from_slice(&bytes[STATUS_PREFIX_LEN + HMAC_LENGTH..]);
        let expected = wire::hmac_sha256(b"shared-key", &signed);
        assert_eq!(&bytes[STATUS_PREFIX_LEN..STATUS_PREFIX_LEN + HMAC_LENGTH], &expected);
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut bytes = build_status_packet(&sample_packet(), "shared-key");
        bytes[8] = 0x02;
        assert_eq!(
            parse_status_packet(&bytes),
            Err(ProtocolError::UnsupportedVersion(0x02))
        );
    }

    #[test]
    fn truncated_status_rejected() {
        let bytes = build_status_packet(&sample_packet(), "shared-key");
        assert!(parse_status_packet(&bytes[..bytes.len() - 5]).is_err());
        assert!(!is_status_packet(&bytes[..MIN_STATUS_SIZE - 1]));
    }

    #[test]
    fn ack_round_trip_and_verification() {
        let bytes = build_ack_packet(ACK_OK, 1_700_000_000_123, "shared-key");
        let ack = parse_ack_packet(&bytes).unwrap();
        assert_eq!(ack.status, ACK_OK);
        assert_eq!(ack.timestamp_millis, 1_700_000_000_123);
        assert!(verify_ack_hmac(&bytes, "shared-key"));
        assert!(!verify_ack_hmac(&bytes, "other-key"));
    }

    #[test]
    fn ack_status_codes_survive_round_trip() {
        for status in [ACK_OK, ACK_UNKNOWN_ID, ACK_BAD_HMAC, ACK_STALE] {
            let bytes = build_ack_packet(status, 5, "k");
            assert_eq!(parse_ack_packet(&bytes).unwrap().status, status);
        }
    }

    #[test]
    fn empty_player_list_round_trip() {
        let mut packet = sample_packet();
        packet.players.clear();
        let bytes = build_status_packet(&packet, "k");
        assert_eq!(parse_status_packet(&bytes).unwrap().players.len(), 0);
    }
}
