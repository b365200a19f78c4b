//! Service configuration with JSON file support.
//!
//! The config lives at `<data-root>/HyQuery/config.json`. Loading is
//! permissive: missing fields are filled from defaults and the file is
//! rewritten (pretty-printed) so operators always see the full option set.
//! A data folder left behind by the legacy plugin name is migrated first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use hyquery_network::NetworkConfig;
use hyquery_protocol::v2::QueryKind;

const DATA_FOLDER: &str = "HyQuery";
const LEGACY_DATA_FOLDER: &str = "Hyvote_HyQuery";
const CONFIG_FILE: &str = "config.json";

/// Endpoint permissions for V2 queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPermissions {
    #[serde(default = "default_true")]
    pub basic: bool,
    #[serde(default = "default_true")]
    pub players: bool,
}

impl Default for AuthPermissions {
    fn default() -> Self {
        Self {
            basic: true,
            players: true,
        }
    }
}

impl AuthPermissions {
    /// The legacy `showPlayerList` toggle maps onto the PLAYERS permission.
    pub fn from_legacy_show_player_list(show_player_list: bool) -> Self {
        Self {
            basic: true,
            players: show_player_list,
        }
    }

    pub fn allows(&self, kind: QueryKind) -> bool {
        match kind {
            QueryKind::Basic => self.basic,
            QueryKind::Players => self.players,
            QueryKind::Challenge | QueryKind::Unknown(_) => true,
        }
    }
}

/// The `authentication` block as written in the config file. The public
/// permissions are optional so that an absent block can fall back to the
/// legacy `showPlayerList` behavior.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSection {
    #[serde(default)]
    pub public_access: Option<AuthPermissions>,
    #[serde(default)]
    pub tokens: HashMap<String, AuthPermissions>,
}

/// Resolved V2 access control consulted by the handler.
#[derive(Clone, Debug)]
pub struct ResolvedAuth {
    pub public_access: AuthPermissions,
    pub tokens: HashMap<String, AuthPermissions>,
}

impl ResolvedAuth {
    /// Public permissions first; otherwise the request's auth token must be
    /// known and allow the endpoint.
    pub fn is_access_allowed(&self, kind: QueryKind, auth_token: Option<&[u8]>) -> bool {
        if self.public_access.allows(kind) {
            return true;
        }

        let Some(token) = auth_token else {
            return false;
        };
        if token.is_empty() {
            return false;
        }
        let Ok(token) = std::str::from_utf8(token) else {
            return false;
        };
        self.tokens
            .get(token)
            .map(|perms| perms.allows(kind))
            .unwrap_or(false)
    }
}

/// Top-level HyQuery configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    /// Master switch for the whole service.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether V1 full responses reveal player names.
    #[serde(default)]
    pub show_player_list: bool,

    /// Whether V1 full responses reveal the plugin list.
    #[serde(default)]
    pub show_plugins: bool,

    /// Whether to serve `customMotd` instead of the host's MOTD.
    #[serde(default)]
    pub use_custom_motd: bool,

    /// Custom MOTD, preserved verbatim including color escapes.
    #[serde(default = "default_custom_motd")]
    pub custom_motd: String,

    #[serde(default = "default_true")]
    pub rate_limit_enabled: bool,

    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u32,

    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u32,

    /// Legacy protocol toggle.
    #[serde(default = "default_true")]
    pub v1_enabled: bool,

    /// Challenge-authenticated protocol toggle.
    #[serde(default = "default_true")]
    pub v2_enabled: bool,

    #[serde(default = "default_challenge_validity")]
    pub challenge_token_validity_seconds: u32,

    /// Empty means an ephemeral secret is generated each start.
    #[serde(default)]
    pub challenge_secret: String,

    /// V2 endpoint access control; absent falls back to `showPlayerList`.
    #[serde(default)]
    pub authentication: Option<AuthSection>,

    #[serde(default)]
    pub network: NetworkConfig,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_custom_motd() -> String {
    "Welcome to My Server!".to_string()
}

fn default_rate_limit_per_second() -> u32 {
    10
}

fn default_rate_limit_burst() -> u32 {
    20
}

fn default_cache_ttl() -> u32 {
    5
}

fn default_challenge_validity() -> u32 {
    30
}

// ── Impl ───────────────────────────────────────────────────────────────

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_player_list: false,
            show_plugins: false,
            use_custom_motd: false,
            custom_motd: default_custom_motd(),
            rate_limit_enabled: true,
            rate_limit_per_second: default_rate_limit_per_second(),
            rate_limit_burst: default_rate_limit_burst(),
            cache_enabled: true,
            cache_ttl_seconds: default_cache_ttl(),
            v1_enabled: true,
            v2_enabled: true,
            challenge_token_validity_seconds: default_challenge_validity(),
            challenge_secret: String::new(),
            authentication: None,
            network: NetworkConfig::default(),
        }
    }
}

impl QueryConfig {
    /// Parse a JSON document, permissively filling missing fields.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<QueryConfig>(json).map(QueryConfig::normalized)
    }

    /// Pretty-printed JSON, as written to disk.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(self).expect("QueryConfig is always serializable")
    }

    /// Clamp nonsensical numeric values to defaults and normalize the
    /// nested network block.
    pub fn normalized(mut self) -> Self {
        if self.rate_limit_per_second == 0 {
            self.rate_limit_per_second = default_rate_limit_per_second();
        }
        if self.rate_limit_burst == 0 {
            self.rate_limit_burst = default_rate_limit_burst();
        }
        if self.cache_ttl_seconds == 0 {
            self.cache_ttl_seconds = default_cache_ttl();
        }
        if self.challenge_token_validity_seconds == 0 {
            self.challenge_token_validity_seconds = default_challenge_validity();
        }
        self.network = self.network.normalized();
        self
    }

    /// Resolve the effective V2 access control. An absent `authentication`
    /// block (or absent `publicAccess`) falls back to the legacy
    /// `showPlayerList` behavior; blank token keys are dropped.
    pub fn resolved_auth(&self) -> ResolvedAuth {
        let legacy = AuthPermissions::from_legacy_show_player_list(self.show_player_list);
        match &self.authentication {
            None => ResolvedAuth {
                public_access: legacy,
                tokens: HashMap::new(),
            },
            Some(section) => ResolvedAuth {
                public_access: section.public_access.unwrap_or(legacy),
                tokens: section
                    .tokens
                    .iter()
                    .filter(|(key, _)| !key.trim().is_empty())
                    .map(|(key, perms)| (key.clone(), *perms))
                    .collect(),
            },
        }
    }

    /// The MOTD override, when the custom MOTD is enabled.
    pub fn custom_motd_override(&self) -> Option<String> {
        self.use_custom_motd.then(|| self.custom_motd.clone())
    }

    /// Path of the config file under a data root.
    pub fn config_path(data_root: &Path) -> PathBuf {
        data_root.join(DATA_FOLDER).join(CONFIG_FILE)
    }

    /// Load the configuration from `<data-root>/HyQuery/config.json`,
    /// creating it (or migrating the legacy folder) as needed. Falls back
    /// to defaults on any error, with a warning.
    pub fn load_or_create(data_root: &Path) -> Self {
        let data_dir = data_root.join(DATA_FOLDER);
        let legacy_dir = data_root.join(LEGACY_DATA_FOLDER);

        if legacy_dir.exists() && !data_dir.exists() {
            match std::fs::rename(&legacy_dir, &data_dir) {
                Ok(()) => tracing::info!(
                    "migrated config folder from {LEGACY_DATA_FOLDER} to {DATA_FOLDER}"
                ),
                Err(e) => tracing::warn!("failed to migrate config folder: {e}"),
            }
        }

        let config_path = data_dir.join(CONFIG_FILE);
        match Self::load_or_create_at(&data_dir, &config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("failed to load/save config, using defaults: {e}");
                Self::default()
            }
        }
    }

    fn load_or_create_at(data_dir: &Path, config_path: &Path) -> Result<Self, std::io::Error> {
        if config_path.exists() {
            let json = std::fs::read_to_string(config_path)?;
            let config = Self::from_json_str(&json)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            // Rewrite so newly added fields appear in the file.
            std::fs::write(config_path, config.to_json_string())?;
            tracing::info!("loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            let config = Self::default();
            std::fs::create_dir_all(data_dir)?;
            std::fs::write(config_path, config.to_json_string())?;
            tracing::info!("created default configuration at {}", config_path.display());
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_protection_knobs() {
        let config = QueryConfig::default();
        assert!(config.enabled);
        assert!(config.rate_limit_enabled);
        assert!(config.cache_enabled);
        assert!(config.v1_enabled);
        assert!(config.v2_enabled);
        assert!(!config.show_player_list);
        assert_eq!(config.rate_limit_per_second, 10);
        assert_eq!(config.rate_limit_burst, 20);
        assert_eq!(config.challenge_token_validity_seconds, 30);
        assert!(config.challenge_secret.is_empty());
    }

    #[test]
    fn json_round_trip_after_default_fill() {
        let config = QueryConfig::default();
        let json = config.to_json_string();
        let parsed = QueryConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed.to_json_string(), json);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = QueryConfig::from_json_str("{}").unwrap();
        assert!(config.enabled);
        assert_eq!(config.cache_ttl_seconds, 5);
        assert!(!config.network.enabled);
    }

    #[test]
    fn partial_document_overrides() {
        let config = QueryConfig::from_json_str(
            r#"{"showPlayerList":true,"rateLimitPerSecond":3,"network":{"enabled":true,"role":"primary"}}"#,
        )
        .unwrap();
        assert!(config.show_player_list);
        assert_eq!(config.rate_limit_per_second, 3);
        assert!(config.network.is_primary());
        assert!(config.cache_enabled);
    }

    #[test]
    fn zero_numerics_clamp_to_defaults() {
        let config = QueryConfig::from_json_str(
            r#"{"rateLimitPerSecond":0,"rateLimitBurst":0,"cacheTtlSeconds":0,"challengeTokenValiditySeconds":0}"#,
        )
        .unwrap();
        assert_eq!(config.rate_limit_per_second, 10);
        assert_eq!(config.rate_limit_burst, 20);
        assert_eq!(config.cache_ttl_seconds, 5);
        assert_eq!(config.challenge_token_validity_seconds, 30);
    }

    #[test]
    fn custom_motd_preserved_verbatim() {
        let config =
            QueryConfig::from_json_str(r#"{"useCustomMotd":true,"customMotd":"§aGreen §lBold"}"#)
                .unwrap();
        assert_eq!(config.custom_motd_override().unwrap(), "§aGreen §lBold");
    }

    #[test]
    fn missing_auth_block_follows_show_player_list() {
        let hidden = QueryConfig::from_json_str(r#"{"showPlayerList":false}"#)
            .unwrap()
            .resolved_auth();
        assert!(hidden.is_access_allowed(QueryKind::Basic, None));
        assert!(!hidden.is_access_allowed(QueryKind::Players, None));

        let shown = QueryConfig::from_json_str(r#"{"showPlayerList":true}"#)
            .unwrap()
            .resolved_auth();
        assert!(shown.is_access_allowed(QueryKind::Players, None));
    }

    #[test]
    fn token_grants_endpoint_access() {
        let config = QueryConfig::from_json_str(
            r#"{
                "authentication": {
                    "publicAccess": {"basic": true, "players": false},
                    "tokens": {
                        "scanner-key": {"basic": true, "players": true},
                        "  ": {"basic": true, "players": true}
                    }
                }
            }"#,
        )
        .unwrap();
        let auth = config.resolved_auth();

        assert!(!auth.is_access_allowed(QueryKind::Players, None));
        assert!(!auth.is_access_allowed(QueryKind::Players, Some(b"wrong")));
        assert!(auth.is_access_allowed(QueryKind::Players, Some(b"scanner-key")));
        assert!(auth.is_access_allowed(QueryKind::Basic, Some(b"wrong")));
        // Blank token keys are dropped during resolution.
        assert_eq!(auth.tokens.len(), 1);
    }

    #[test]
    fn load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = QueryConfig::load_or_create(dir.path());
        assert!(config.enabled);

        let path = QueryConfig::config_path(dir.path());
        assert!(path.exists());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"rateLimitPerSecond\": 10"));
    }

    #[test]
    fn load_fills_missing_fields_and_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join(DATA_FOLDER);
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(data_dir.join(CONFIG_FILE), r#"{"showPlugins":true}"#).unwrap();

        let config = QueryConfig::load_or_create(dir.path());
        assert!(config.show_plugins);
        assert_eq!(config.cache_ttl_seconds, 5);

        let rewritten = std::fs::read_to_string(data_dir.join(CONFIG_FILE)).unwrap();
        assert!(rewritten.contains("cacheTtlSeconds"));
        assert!(rewritten.contains("network"));
    }

    #[test]
    fn legacy_folder_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let legacy_dir = dir.path().join(LEGACY_DATA_FOLDER);
        std::fs::create_dir_all(&legacy_dir).unwrap();
        std::fs::write(legacy_dir.join(CONFIG_FILE), r#"{"showPlayerList":true}"#).unwrap();

        let config = QueryConfig::load_or_create(dir.path());
        assert!(config.show_player_list);
        assert!(dir.path().join(DATA_FOLDER).exists());
        assert!(!legacy_dir.exists());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join(DATA_FOLDER);
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(data_dir.join(CONFIG_FILE), "{not valid json").unwrap();

        let config = QueryConfig::load_or_create(dir.path());
        assert!(config.enabled);
        assert_eq!(config.rate_limit_per_second, 10);
    }
}
