//! Self-contained JSON snapshot published to the shared store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::player::Player;

/// A worker's published state, as stored under
/// `hyquery:{<namespace>}:server:<id>`.
///
/// Parsing is permissive: missing strings default to empty, and player
/// entries with unparsable UUIDs are skipped rather than failing the whole
/// snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub motd: String,
    #[serde(default)]
    pub online_players: i32,
    #[serde(default)]
    pub max_players: i32,
    #[serde(default)]
    pub port: i32,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub players: Vec<SnapshotPlayer>,
    #[serde(default)]
    pub updated_at_millis: i64,
}

/// Player entry inside a store snapshot; the UUID travels as its string form.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SnapshotPlayer {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub uuid: String,
}

impl RemoteSnapshot {
    /// Convert the snapshot's player entries into domain players, skipping
    /// entries with a blank or unparsable UUID.
    pub fn to_players(&self) -> Vec<Player> {
        self.players
            .iter()
            .filter_map(|p| {
                let uuid = Uuid::parse_str(p.uuid.trim()).ok()?;
                Some(Player::new(p.username.clone(), uuid))
            })
            .collect()
    }

    pub fn from_players(players: &[Player]) -> Vec<SnapshotPlayer> {
        players
            .iter()
            .map(|p| SnapshotPlayer {
                username: p.username.clone(),
                uuid: p.uuid.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_fields() {
        let snapshot = RemoteSnapshot {
            server_id: "game-1".into(),
            server_name: "Game 1".into(),
            motd: "hi".into(),
            online_players: 4,
            max_players: 60,
            port: 5520,
            version: "1.2".into(),
            players: RemoteSnapshot::from_players(&[Player::new(
                "alice",
                Uuid::from_u128(0xDEAD_BEEF),
            )]),
            updated_at_millis: 1_700_000_000_123,
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: RemoteSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.server_id, "game-1");
        assert_eq!(parsed.online_players, 4);
        assert_eq!(parsed.updated_at_millis, 1_700_000_000_123);
        assert_eq!(parsed.to_players().len(), 1);
        assert_eq!(parsed.to_players()[0].username, "alice");
    }

    #[test]
    fn missing_fields_default() {
        let parsed: RemoteSnapshot =
            serde_json::from_str(r#"{"serverId":"w1","updatedAtMillis":5}"#).unwrap();
        assert_eq!(parsed.server_id, "w1");
        assert_eq!(parsed.server_name, "");
        assert_eq!(parsed.online_players, 0);
        assert!(parsed.players.is_empty());
    }

    #[test]
    fn bad_player_uuid_is_skipped() {
        let parsed: RemoteSnapshot = serde_json::from_str(
            r#"{"serverId":"w1","players":[
                {"username":"ok","uuid":"00000000-0000-0000-0000-000000000001"},
                {"username":"bad","uuid":"not-a-uuid"},
                {"username":"blank","uuid":""}
            ]}"#,
        )
        .unwrap();
        let players = parsed.to_players();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].username, "ok");
    }
}
