//! Challenge-authenticated V2 query format.
//!
//! Two wire-compatible magic families exist (`ONEQUERY`/`ONEREPLY` and
//! `HYQUERY2`/`HYREPLY2`); a response always uses the magic paired with the
//! request's family. Payloads are TLV-encoded, and the player list paginates
//! under an MTU-safe budget.

use hyquery_types::Player;

use crate::error::ProtocolError;
use crate::wire;

pub const VERSION: u8 = 0x01;

pub const TYPE_CHALLENGE: u8 = 0x00;
pub const TYPE_BASIC: u8 = 0x01;
pub const TYPE_PLAYERS: u8 = 0x02;

/// Request flag: an auth token follows the fixed header.
pub const FLAG_REQUEST_HAS_AUTH_TOKEN: u16 = 0x0001;

pub const FLAG_RESPONSE_HAS_MORE_PLAYERS: u16 = 0x0001;
pub const FLAG_RESPONSE_AUTH_REQUIRED: u16 = 0x0002;
pub const FLAG_RESPONSE_IS_NETWORK: u16 = 0x0010;
pub const FLAG_RESPONSE_HAS_ADDRESS: u16 = 0x0020;

pub const TLV_TYPE_SERVER_INFO: u16 = 0x0001;
pub const TLV_TYPE_PLAYER_LIST: u16 = 0x0002;

pub const CHALLENGE_TOKEN_SIZE: usize = 32;
/// Response header: 8 magic + 1 version + 2 flags + 4 request id + 2 length.
pub const HEADER_SIZE: usize = 17;
/// Ceiling chosen to fit within common path MTUs without fragmentation.
pub const SAFE_MTU: usize = 1400;
/// Payload budget after the header and a safety margin.
pub const MAX_PAYLOAD_SIZE: usize = SAFE_MTU - HEADER_SIZE - 50;

const TLV_HEADER_SIZE: usize = 4;
const PLAYER_LIST_HEADER_SIZE: usize = 12;

/// Which magic-byte pair a request/response uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestFamily {
    OneQuery,
    HyQuery2,
}

impl RequestFamily {
    pub fn request_magic(&self) -> &'static [u8; 8] {
        match self {
            Self::OneQuery => b"ONEQUERY",
            Self::HyQuery2 => b"HYQUERY2",
        }
    }

    pub fn response_magic(&self) -> &'static [u8; 8] {
        match self {
            Self::OneQuery => b"ONEREPLY",
            Self::HyQuery2 => b"HYREPLY2",
        }
    }
}

/// V2 endpoint selector. Unrecognized type bytes are preserved so the
/// handler can apply its unknown-type fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryKind {
    Challenge,
    Basic,
    Players,
    Unknown(u8),
}

impl QueryKind {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            TYPE_CHALLENGE => Self::Challenge,
            TYPE_BASIC => Self::Basic,
            TYPE_PLAYERS => Self::Players,
            other => Self::Unknown(other),
        }
    }
}

/// A parsed V2 request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum V2Request {
    Challenge {
        family: RequestFamily,
    },
    Query {
        family: RequestFamily,
        kind: QueryKind,
        request_id: u32,
        flags: u16,
        offset: u32,
        challenge_token: [u8; CHALLENGE_TOKEN_SIZE],
        auth_token: Option<Vec<u8>>,
    },
}

/// Detect the request family from the leading magic bytes.
pub fn detect_request_family(data: &[u8]) -> Option<RequestFamily> {
    if data.len() < 8 {
        return None;
    }
    if data.starts_with(RequestFamily::OneQuery.request_magic()) {
        Some(RequestFamily::OneQuery)
    } else if data.starts_with(RequestFamily::HyQuery2.request_magic()) {
        Some(RequestFamily::HyQuery2)
    } else {
        None
    }
}

/// Whether the datagram is a well-formed-enough V2 request to attempt parsing.
pub fn is_v2_request(data: &[u8]) -> bool {
    detect_request_family(data).is_some() && data.len() >= 9
}

/// Whether the datagram carries any V2 magic, request or response.
pub fn is_known_v2_packet(data: &[u8]) -> bool {
    detect_request_family(data).is_some() || matches_any_response_magic(data)
}

pub fn matches_any_response_magic(data: &[u8]) -> bool {
    data.len() >= 8
        && (data.starts_with(RequestFamily::OneQuery.response_magic())
            || data.starts_with(RequestFamily::HyQuery2.response_magic()))
}

pub fn parse_request(data: &[u8]) -> Result<V2Request, ProtocolError> {
    let family = detect_request_family(data).ok_or(ProtocolError::BadMagic)?;
    let mut rest = &data[8..];

    let raw_type = wire::get_u8(&mut rest)?;
    let kind = QueryKind::from_raw(raw_type);
    if kind == QueryKind::Challenge {
        return Ok(V2Request::Challenge { family });
    }

    let token_bytes = wire::get_bytes(&mut rest, CHALLENGE_TOKEN_SIZE)?;
    let mut challenge_token = [0u8; CHALLENGE_TOKEN_SIZE];
    challenge_token.copy_from_slice(token_bytes);

    let request_id = wire::get_u32_le(&mut rest)?;
    let flags = wire::get_u16_le(&mut rest)?;
    let offset = wire::get_u32_le(&mut rest)?;

    let auth_token = if flags & FLAG_REQUEST_HAS_AUTH_TOKEN != 0 {
        let len = wire::get_u16_le(&mut rest)? as usize;
        let raw = wire::get_bytes(&mut rest, len)
            .map_err(|_| ProtocolError::Malformed("auth token length exceeds packet".into()))?;
        Some(raw.to_vec())
    } else {
        None
    };

    Ok(V2Request::Query {
        family,
        kind,
        request_id,
        flags,
        offset,
        challenge_token,
        auth_token,
    })
}

/// Build a challenge request (client side / tests).
pub fn build_challenge_request(family: RequestFamily) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    buf.extend_from_slice(family.request_magic());
    buf.push(TYPE_CHALLENGE);
    buf
}

/// Build a query request (client side / tests).
pub fn build_query_request(
    family: RequestFamily,
    raw_type: u8,
    challenge_token: &[u8; CHALLENGE_TOKEN_SIZE],
    request_id: u32,
    offset: u32,
    auth_token: Option<&[u8]>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(family.request_magic());
    buf.push(raw_type);
    buf.extend_from_slice(challenge_token);
    buf.extend_from_slice(&request_id.to_le_bytes());
    let flags: u16 = if auth_token.is_some() {
        FLAG_REQUEST_HAS_AUTH_TOKEN
    } else {
        0
    };
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
    if let Some(token) = auth_token {
        buf.extend_from_slice(&(token.len() as u16).to_le_bytes());
        buf.extend_from_slice(token);
    }
    buf
}

// ── Responses ───────────────────────────────────────────────────────────

/// Server identity carried in a `SERVER_INFO` TLV.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_name: String,
    pub motd: String,
    pub online_players: i32,
    pub max_players: i32,
    pub version: String,
    pub protocol_version: i32,
    pub protocol_hash: String,
    /// Written only when the response carries `HAS_ADDRESS`.
    pub address: Option<(String, u16)>,
}

/// Decoded V2 response header plus raw payload.
#[derive(Clone, Debug)]
pub struct V2Response {
    pub family: RequestFamily,
    pub version: u8,
    pub flags: u16,
    pub request_id: u32,
    pub payload: Vec<u8>,
}

/// Decoded `PLAYER_LIST` TLV value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerListPayload {
    pub total_players: i32,
    pub count_in_response: i32,
    pub start_offset: i32,
    pub players: Vec<Player>,
}

/// Build the 48-byte challenge response: magic, type, token, 7 zero bytes.
pub fn build_challenge_response(
    family: RequestFamily,
    token: &[u8; CHALLENGE_TOKEN_SIZE],
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(48);
    buf.extend_from_slice(family.response_magic());
    buf.push(TYPE_CHALLENGE);
    buf.extend_from_slice(token);
    buf.extend_from_slice(&[0u8; 7]);
    buf
}

fn build_packet(family: RequestFamily, request_id: u32, flags: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(family.response_magic());
    buf.push(VERSION);
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&request_id.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn put_tlv(buf: &mut Vec<u8>, tlv_type: u16, value: &[u8]) {
    buf.extend_from_slice(&tlv_type.to_le_bytes());
    buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
    buf.extend_from_slice(value);
}

fn put_server_info(buf: &mut Vec<u8>, info: &ServerInfo, include_address: bool) {
    wire::put_string(buf, &info.server_name);
    wire::put_string(buf, &info.motd);
    buf.extend_from_slice(&info.online_players.to_le_bytes());
    buf.extend_from_slice(&info.max_players.to_le_bytes());
    wire::put_string(buf, &info.version);
    buf.extend_from_slice(&info.protocol_version.to_le_bytes());
    wire::put_string(buf, &info.protocol_hash);

    if include_address {
        if let Some((host, port)) = &info.address {
            if !host.is_empty() {
                wire::put_string(buf, host);
                buf.extend_from_slice(&port.to_le_bytes());
            }
        }
    }
}

/// Build a BASIC response carrying a single `SERVER_INFO` TLV.
pub fn build_basic_response(
    family: RequestFamily,
    request_id: u32,
    flags: u16,
    info: &ServerInfo,
) -> Vec<u8> {
    let mut value = Vec::new();
    put_server_info(
        &mut value,
        info,
        flags & FLAG_RESPONSE_HAS_ADDRESS != 0,
    );

    let mut payload = Vec::new();
    put_tlv(&mut payload, TLV_TYPE_SERVER_INFO, &value);
    build_packet(family, request_id, flags, &payload)
}

/// Build a PLAYERS response, paginating from `requested_offset` under the
/// MTU budget. Sets `HAS_MORE_PLAYERS` when entries remain unemitted.
pub fn build_players_response(
    family: RequestFamily,
    request_id: u32,
    base_flags: u16,
    requested_offset: u32,
    players: &[Player],
) -> Vec<u8> {
    let mut flags = base_flags;

    let total_players = players.len();
    let start_index = (requested_offset as usize).min(total_players);

    let mut value = Vec::new();
    value.extend_from_slice(&(total_players as i32).to_le_bytes());
    let count_position = value.len();
    value.extend_from_slice(&0i32.to_le_bytes());
    value.extend_from_slice(&(start_index as i32).to_le_bytes());

    let mut count_in_response: i32 = 0;
    let mut remaining = MAX_PAYLOAD_SIZE - TLV_HEADER_SIZE - PLAYER_LIST_HEADER_SIZE;

    for player in &players[start_index..] {
        let username_bytes = player.username.as_bytes();
        let entry_size = 2 + username_bytes.len() + 16;

        if remaining < entry_size {
            flags |= FLAG_RESPONSE_HAS_MORE_PLAYERS;
            break;
        }

        wire::put_string(&mut value, &player.username);
        wire::put_uuid(&mut value, &player.uuid);

        remaining -= entry_size;
        count_in_response += 1;
    }

    value[count_position..count_position + 4].copy_from_slice(&count_in_response.to_le_bytes());

    let mut payload = Vec::new();
    put_tlv(&mut payload, TLV_TYPE_PLAYER_LIST, &value);
    build_packet(family, request_id, flags, &payload)
}

/// Decode a V2 response header and payload.
pub fn parse_response(data: &[u8]) -> Result<V2Response, ProtocolError> {
    let family = if data.len() >= 8 && data.starts_with(RequestFamily::OneQuery.response_magic()) {
        RequestFamily::OneQuery
    } else if data.len() >= 8 && data.starts_with(RequestFamily::HyQuery2.response_magic()) {
        RequestFamily::HyQuery2
    } else {
        return Err(ProtocolError::BadMagic);
    };

    let mut rest = &data[8..];
    let version = wire::get_u8(&mut rest)?;
    let flags = wire::get_u16_le(&mut rest)?;
    let request_id = wire::get_u32_le(&mut rest)?;
    let payload_len = wire::get_u16_le(&mut rest)? as usize;
    let payload = wire::get_bytes(&mut rest, payload_len)?;

    Ok(V2Response {
        family,
        version,
        flags,
        request_id,
        payload: payload.to_vec(),
    })
}

/// Extract the first TLV of the requested type from a response payload.
pub fn find_tlv(payload: &[u8], wanted: u16) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut rest = payload;
    while !rest.is_empty() {
        let tlv_type = wire::get_u16_le(&mut rest)?;
        let len = wire::get_u16_le(&mut rest)? as usize;
        let value = wire::get_bytes(&mut rest, len)?;
        if tlv_type == wanted {
            return Ok(Some(value.to_vec()));
        }
    }
    Ok(None)
}

/// Decode a `SERVER_INFO` TLV value.
pub fn parse_server_info(value: &[u8]) -> Result<ServerInfo, ProtocolError> {
    let mut rest = value;
    let server_name = wire::get_string(&mut rest)?;
    let motd = wire::get_string(&mut rest)?;
    let online_players = wire::get_i32_le(&mut rest)?;
    let max_players = wire::get_i32_le(&mut rest)?;
    let version = wire::get_string(&mut rest)?;
    let protocol_version = wire::get_i32_le(&mut rest)?;
    let protocol_hash = wire::get_string(&mut rest)?;

    let address = if rest.is_empty() {
        None
    } else {
        let host = wire::get_string(&mut rest)?;
        let port = wire::get_u16_le(&mut rest)?;
        Some((host, port))
    };

    Ok(ServerInfo {
        server_name,
        motd,
        online_players,
        max_players,
        version,
        protocol_version,
        protocol_hash,
        address,
    })
}

/// Decode a `PLAYER_LIST` TLV value.
pub fn parse_player_list(value: &[u8]) -> Result<PlayerListPayload, ProtocolError> {
    let mut rest = value;
    let total_players = wire::get_i32_le(&mut rest)?;
    let count_in_response = wire::get_i32_le(&mut rest)?;
    let start_offset = wire::get_i32_le(&mut rest)?;

    let mut players = Vec::with_capacity(count_in_response.clamp(0, 4096) as usize);
    for _ in 0..count_in_response {
        let username = wire::get_string(&mut rest)?;
        let uuid = wire::get_uuid(&mut rest)?;
        players.push(Player::new(username, uuid));
    }

    Ok(PlayerListPayload {
        total_players,
        count_in_response,
        start_offset,
        players,
    })
}
