//! Legacy V1 query format.
//!
//! Request: `HYQUERY\0` + 1-byte type. Response: `HYREPLY\0` + type +
//! server fields; the "full" variant appends player, plugin, and remote
//! server lists. Lists the server is configured not to reveal are encoded
//! as count 0.

use uuid::Uuid;

use crate::error::ProtocolError;
use crate::wire;

pub const REQUEST_MAGIC: &[u8; 8] = b"HYQUERY\0";
pub const RESPONSE_MAGIC: &[u8; 8] = b"HYREPLY\0";

pub const TYPE_BASIC: u8 = 0x00;
pub const TYPE_FULL: u8 = 0x01;

/// A parsed V1 request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct V1Request {
    pub query_type: u8,
}

impl V1Request {
    /// Any type byte other than `TYPE_FULL` is served the basic response.
    pub fn wants_full(&self) -> bool {
        self.query_type == TYPE_FULL
    }
}

/// Server identity fields shared by both response variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct V1ServerInfo {
    pub server_name: String,
    pub motd: String,
    pub online_players: u32,
    pub max_players: u32,
    pub port: u32,
    pub version: String,
}

/// Player entry in a V1 full response. `server_id` is empty for local
/// players and names the source server for network players.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct V1PlayerEntry {
    pub username: String,
    pub uuid: Uuid,
    pub server_id: String,
}

/// Remote server entry in a V1 full response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct V1RemoteServer {
    pub server_id: String,
    pub server_name: String,
    pub motd: String,
    pub online_players: u32,
    pub max_players: u32,
    pub status: u8,
    pub updated_at_millis: i64,
    pub players: Vec<(String, Uuid)>,
}

/// A fully decoded V1 response, for clients and round-trip tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct V1Response {
    pub query_type: u8,
    pub info: V1ServerInfo,
    pub players: Vec<V1PlayerEntry>,
    pub plugins: Vec<String>,
    pub remote_servers: Vec<V1RemoteServer>,
}

/// Whether the datagram starts with the V1 request magic.
pub fn is_query_request(data: &[u8]) -> bool {
    data.len() >= REQUEST_MAGIC.len() && data.starts_with(REQUEST_MAGIC)
}

pub fn parse_request(data: &[u8]) -> Result<V1Request, ProtocolError> {
    if !data.starts_with(REQUEST_MAGIC) {
        return Err(ProtocolError::BadMagic);
    }
    let mut rest = &data[REQUEST_MAGIC.len()..];
    let query_type = wire::get_u8(&mut rest)?;
    Ok(V1Request { query_type })
}

pub fn build_request(query_type: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(REQUEST_MAGIC.len() + 1);
    buf.extend_from_slice(REQUEST_MAGIC);
    buf.push(query_type);
    buf
}

fn put_server_info(buf: &mut Vec<u8>, info: &V1ServerInfo) {
    wire::put_string(buf, &info.server_name);
    wire::put_string(buf, &info.motd);
    buf.extend_from_slice(&info.online_players.to_le_bytes());
    buf.extend_from_slice(&info.max_players.to_le_bytes());
    buf.extend_from_slice(&info.port.to_le_bytes());
    wire::put_string(buf, &info.version);
}

/// Build a basic response: identity and counts only.
pub fn build_basic_response(info: &V1ServerInfo) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(RESPONSE_MAGIC);
    buf.push(TYPE_BASIC);
    put_server_info(&mut buf, info);
    buf
}

/// Build a full response with player, plugin, and remote server lists.
pub fn build_full_response(
    info: &V1ServerInfo,
    players: &[V1PlayerEntry],
    plugins: &[String],
    remote_servers: &[V1RemoteServer],
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(RESPONSE_MAGIC);
    buf.push(TYPE_FULL);
    put_server_info(&mut buf, info);

    buf.extend_from_slice(&(players.len() as u32).to_le_bytes());
    for player in players {
        wire::put_string(&mut buf, &player.username);
        wire::put_uuid(&mut buf, &player.uuid);
        wire::put_string(&mut buf, &player.server_id);
    }

    buf.extend_from_slice(&(plugins.len() as u32).to_le_bytes());
    for plugin in plugins {
        wire::put_string(&mut buf, plugin);
    }

    buf.extend_from_slice(&(remote_servers.len() as u32).to_le_bytes());
    for remote in remote_servers {
        wire::put_string(&mut buf, &remote.server_id);
        wire::put_string(&mut buf, &remote.server_name);
        wire::put_string(&mut buf, &remote.motd);
        buf.extend_from_slice(&remote.online_players.to_le_bytes());
        buf.extend_from_slice(&remote.max_players.to_le_bytes());
        buf.push(remote.status);
        buf.extend_from_slice(&remote.updated_at_millis.to_le_bytes());
        buf.extend_from_slice(&(remote.players.len() as u32).to_le_bytes());
        for (username, uuid) in &remote.players {
            wire::put_string(&mut buf, username);
            wire::put_uuid(&mut buf, uuid);
        }
    }

    buf
}

fn get_server_info(rest: &mut &[u8]) -> Result<V1ServerInfo, ProtocolError> {
    Ok(V1ServerInfo {
        server_name: wire::get_string(rest)?,
        motd: wire::get_string(rest)?,
        online_players: wire::get_u32_le(rest)?,
        max_players: wire::get_u32_le(rest)?,
        port: wire::get_u32_le(rest)?,
        version: wire::get_string(rest)?,
    })
}

/// Decode a V1 response of either type.
pub fn parse_response(data: &[u8]) -> Result<V1Response, ProtocolError> {
    if !data.starts_with(RESPONSE_MAGIC) {
        return Err(ProtocolError::BadMagic);
    }
    let mut rest = &data[RESPONSE_MAGIC.len()..];
    let query_type = wire::get_u8(&mut rest)?;
    let info = get_server_info(&mut rest)?;

    if query_type != TYPE_FULL {
        return Ok(V1Response {
            query_type,
            info,
            players: Vec::new(),
            plugins: Vec::new(),
            remote_servers: Vec::new(),
        });
    }

    let player_count = wire::get_u32_le(&mut rest)?;
    let mut players = Vec::with_capacity(player_count.min(4096) as usize);
    for _ in 0..player_count {
        players.push(V1PlayerEntry {
            username: wire::get_string(&mut rest)?,
            uuid: wire::get_uuid(&mut rest)?,
            server_id: wire::get_string(&mut rest)?,
        });
    }

    let plugin_count = wire::get_u32_le(&mut rest)?;
    let mut plugins = Vec::with_capacity(plugin_count.min(4096) as usize);
    for _ in 0..plugin_count {
        plugins.push(wire::get_string(&mut rest)?);
    }

    let remote_count = wire::get_u32_le(&mut rest)?;
    let mut remote_servers = Vec::with_capacity(remote_count.min(4096) as usize);
    for _ in 0..remote_count {
        let server_id = wire::get_string(&mut rest)?;
        let server_name = wire::get_string(&mut rest)?;
        let motd = wire::get_string(&mut rest)?;
        let online_players = wire::get_u32_le(&mut rest)?;
        let max_players = wire::get_u32_le(&mut rest)?;
        let status = wire::get_u8(&mut rest)?;
        let updated_at_millis = wire::get_i64_le(&mut rest)?;
        let remote_player_count = wire::get_u32_le(&mut rest)?;
        let mut remote_players = Vec::with_capacity(remote_player_count.min(4096) as usize);
        for _ in 0..remote_player_count {
            let username = wire::get_string(&mut rest)?;
            let uuid = wire::get_uuid(&mut rest)?;
            remote_players.push((username, uuid));
        }
        remote_servers.push(V1RemoteServer {
            server_id,
            server_name,
            motd,
            online_players,
            max_players,
            status,
            updated_at_millis,
            players: remote_players,
        });
    }

    Ok(V1Response {
        query_type,
        info,
        players,
        plugins,
        remote_servers,
    })
}
