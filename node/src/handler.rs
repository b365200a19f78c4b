//! Request handler: the single entry point for datagrams on the shared port.
//!
//! One handler instance is installed per listener channel. For each inbound
//! datagram it either answers the query itself, consumes a bad or disabled
//! query-family packet, or yields foreign traffic to the game transport.
//! Nothing in here may panic past the handler boundary; every failure is
//! logged and contained.

use std::net::SocketAddr;
use std::sync::Arc;

use hyquery_network::demux::{classify, PacketKind};
use hyquery_network::{ChallengeService, NetworkError, NetworkManager, QueryRateLimiter};
use hyquery_protocol::v1;
use hyquery_protocol::v2::{self, QueryKind, RequestFamily, V2Request};
use hyquery_types::{HostSnapshot, NetworkAggregate, Player, ServerHost};

use crate::cache::{ResponseCache, ResponseKind};
use crate::config::{QueryConfig, ResolvedAuth};
use crate::error::NodeError;

/// What to do with an inbound datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerAction {
    /// Send these bytes back to the datagram's source.
    Respond(Vec<u8>),
    /// Consume the datagram silently.
    Consume,
    /// Hand the datagram to the next transport unchanged.
    Forward,
}

/// Shared, concurrency-safe query handler.
pub struct QueryHandler {
    host: Arc<dyn ServerHost>,
    rate_limiter: Option<Arc<QueryRateLimiter>>,
    cache: Option<Arc<ResponseCache>>,
    network: Option<Arc<NetworkManager>>,
    challenge: Option<ChallengeService>,
    auth: ResolvedAuth,
    v1_enabled: bool,
    v2_enabled: bool,
    show_player_list: bool,
    show_plugins: bool,
    custom_motd: Option<String>,
}

impl QueryHandler {
    pub fn new(
        config: &QueryConfig,
        host: Arc<dyn ServerHost>,
        rate_limiter: Option<Arc<QueryRateLimiter>>,
        cache: Option<Arc<ResponseCache>>,
        network: Option<Arc<NetworkManager>>,
    ) -> Self {
        let challenge = config.v2_enabled.then(|| {
            ChallengeService::from_config(
                &config.challenge_secret,
                config.challenge_token_validity_seconds,
            )
        });
        if config.v2_enabled && config.challenge_secret.trim().is_empty() {
            tracing::info!("V2 challenge secret not configured; using ephemeral secret for this runtime");
        }

        Self {
            host,
            rate_limiter,
            cache,
            network,
            challenge,
            auth: config.resolved_auth(),
            v1_enabled: config.v1_enabled,
            v2_enabled: config.v2_enabled,
            show_player_list: config.show_player_list,
            show_plugins: config.show_plugins,
            custom_motd: config.custom_motd_override(),
        }
    }

    /// Classify and handle one datagram.
    pub async fn process(&self, data: &[u8], sender: SocketAddr) -> HandlerAction {
        match classify(data) {
            PacketKind::V2Query(_) if self.v2_enabled => self.handle_v2(data, sender).await,
            PacketKind::V1Query if self.v1_enabled => self.handle_v1(data, sender).await,
            PacketKind::Status if self.handles_status_packets() => {
                self.handle_status(data, sender).await
            }
            PacketKind::Foreign => HandlerAction::Forward,
            _ => {
                tracing::debug!("dropping unhandled query-family packet from {sender}");
                HandlerAction::Consume
            }
        }
    }

    fn handles_status_packets(&self) -> bool {
        self.network
            .as_ref()
            .map(|n| n.handles_status_packets())
            .unwrap_or(false)
    }

    fn allow(&self, sender: SocketAddr) -> bool {
        match &self.rate_limiter {
            Some(limiter) => limiter.try_acquire(sender.ip()),
            None => true,
        }
    }

    // ── V1 ──────────────────────────────────────────────────────────────

    async fn handle_v1(&self, data: &[u8], sender: SocketAddr) -> HandlerAction {
        if !self.allow(sender) {
            tracing::debug!("rate limited V1 query from {sender}");
            return HandlerAction::Consume;
        }

        let request = match v1::parse_request(data) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("dropping malformed V1 request from {sender}: {e}");
                return HandlerAction::Consume;
            }
        };

        let built = if let Some(cache) = &self.cache {
            let kind = if request.wants_full() {
                ResponseKind::Full
            } else {
                ResponseKind::Basic
            };
            cache
                .get_or_build(kind, || async {
                    if request.wants_full() {
                        self.build_v1_full().await
                    } else {
                        self.build_v1_basic().await
                    }
                })
                .await
                .map(|data| data.to_vec())
        } else if request.wants_full() {
            self.build_v1_full().await
        } else {
            self.build_v1_basic().await
        };

        match built {
            Ok(bytes) => {
                tracing::debug!("handled V1 query from {sender}");
                HandlerAction::Respond(bytes)
            }
            Err(e) => {
                tracing::warn!("error handling V1 query from {sender}: {e}");
                HandlerAction::Consume
            }
        }
    }

    async fn build_v1_basic(&self) -> Result<Vec<u8>, NodeError> {
        let snapshot = HostSnapshot::capture(self.host.as_ref());
        let aggregate = self.aggregate(false).await?;
        Ok(v1::build_basic_response(
            &self.v1_server_info(&snapshot, &aggregate),
        ))
    }

    async fn build_v1_full(&self) -> Result<Vec<u8>, NodeError> {
        let snapshot = HostSnapshot::capture(self.host.as_ref());
        let aggregate = self.aggregate(true).await?;
        let info = self.v1_server_info(&snapshot, &aggregate);

        let players = if self.show_player_list {
            let mut players: Vec<v1::V1PlayerEntry> = snapshot
                .players
                .iter()
                .map(|p| v1::V1PlayerEntry {
                    username: p.username.clone(),
                    uuid: p.uuid,
                    server_id: String::new(),
                })
                .collect();
            for network_player in &aggregate.network_players {
                players.push(v1::V1PlayerEntry {
                    username: network_player.username.clone(),
                    uuid: network_player.uuid,
                    server_id: network_player.server_id.clone(),
                });
            }
            players
        } else {
            Vec::new()
        };

        let plugins = if self.show_plugins {
            snapshot.plugins.clone()
        } else {
            Vec::new()
        };

        let remote_servers: Vec<v1::V1RemoteServer> = aggregate
            .remote_servers
            .iter()
            .map(|remote| v1::V1RemoteServer {
                server_id: remote.server_id.clone(),
                server_name: remote.server_name.clone(),
                motd: remote.motd.clone(),
                online_players: remote.online_players.max(0) as u32,
                max_players: remote.max_players.max(0) as u32,
                status: remote.status,
                updated_at_millis: remote.updated_at_millis,
                players: remote
                    .players
                    .iter()
                    .map(|p| (p.username.clone(), p.uuid))
                    .collect(),
            })
            .collect();

        Ok(v1::build_full_response(
            &info,
            &players,
            &plugins,
            &remote_servers,
        ))
    }

    fn v1_server_info(
        &self,
        snapshot: &HostSnapshot,
        aggregate: &NetworkAggregate,
    ) -> v1::V1ServerInfo {
        v1::V1ServerInfo {
            server_name: snapshot.server_name.clone(),
            motd: self.effective_motd(snapshot),
            online_players: (snapshot.online_players() + aggregate.total_online).max(0) as u32,
            max_players: (snapshot.max_players + aggregate.total_max).max(0) as u32,
            port: snapshot.bind_port as u32,
            version: snapshot.version.clone(),
        }
    }

    // ── V2 ──────────────────────────────────────────────────────────────

    async fn handle_v2(&self, data: &[u8], sender: SocketAddr) -> HandlerAction {
        let Some(challenge) = &self.challenge else {
            return HandlerAction::Consume;
        };

        let request = match v2::parse_request(data) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("dropping malformed V2 request from {sender}: {e}");
                return HandlerAction::Consume;
            }
        };

        match request {
            V2Request::Challenge { family } => {
                if !self.allow(sender) {
                    tracing::debug!("rate limited V2 challenge request from {sender}");
                    return HandlerAction::Consume;
                }
                let token = challenge.mint(sender.ip());
                tracing::debug!("handled V2 challenge request from {sender}");
                HandlerAction::Respond(v2::build_challenge_response(family, &token))
            }
            V2Request::Query {
                family,
                kind,
                request_id,
                flags,
                offset,
                challenge_token,
                auth_token,
            } => {
                if !self.allow(sender) {
                    tracing::debug!("rate limited V2 query from {sender}");
                    return HandlerAction::Consume;
                }

                if !challenge.verify(&challenge_token, sender.ip()) {
                    tracing::warn!("dropping V2 request with invalid challenge token from {sender}");
                    return HandlerAction::Consume;
                }

                let effective = match kind {
                    QueryKind::Unknown(_) => QueryKind::Basic,
                    other => other,
                };

                if !self
                    .auth
                    .is_access_allowed(effective, auth_token.as_deref())
                {
                    tracing::debug!("V2 auth required for {effective:?} from {sender}");
                    return self
                        .respond_or_consume(
                            self.build_v2_basic(
                                family,
                                request_id,
                                flags,
                                v2::FLAG_RESPONSE_AUTH_REQUIRED,
                            )
                            .await,
                            sender,
                        );
                }

                let built = if effective == QueryKind::Players {
                    self.build_v2_players(family, request_id, offset).await
                } else {
                    self.build_v2_basic(family, request_id, flags, 0).await
                };
                tracing::debug!("handled V2 query from {sender} (type={effective:?})");
                self.respond_or_consume(built, sender)
            }
        }
    }

    fn respond_or_consume(
        &self,
        built: Result<Vec<u8>, NodeError>,
        sender: SocketAddr,
    ) -> HandlerAction {
        match built {
            Ok(bytes) => HandlerAction::Respond(bytes),
            Err(e) => {
                tracing::warn!("error handling V2 query from {sender}: {e}");
                HandlerAction::Consume
            }
        }
    }

    async fn build_v2_basic(
        &self,
        family: RequestFamily,
        request_id: u32,
        request_flags: u16,
        base_flags: u16,
    ) -> Result<Vec<u8>, NodeError> {
        let snapshot = HostSnapshot::capture(self.host.as_ref());
        let aggregate = self.aggregate(false).await?;

        let mut flags = base_flags;
        if !aggregate.is_empty() {
            flags |= v2::FLAG_RESPONSE_IS_NETWORK;
        }

        // The address is revealed only when the caller asked for it and the
        // host actually knows both halves.
        let mut address = None;
        if request_flags & v2::FLAG_RESPONSE_HAS_ADDRESS != 0 {
            if let Some((host, port)) = self.host.public_address() {
                if !host.is_empty() {
                    flags |= v2::FLAG_RESPONSE_HAS_ADDRESS;
                    address = Some((host, port));
                }
            }
        }

        let info = v2::ServerInfo {
            server_name: snapshot.server_name.clone(),
            motd: self.effective_motd(&snapshot),
            online_players: snapshot.online_players() + aggregate.total_online,
            max_players: snapshot.max_players + aggregate.total_max,
            version: snapshot.version.clone(),
            protocol_version: self.host.protocol_version(),
            protocol_hash: self.host.protocol_hash(),
            address,
        };

        Ok(v2::build_basic_response(family, request_id, flags, &info))
    }

    async fn build_v2_players(
        &self,
        family: RequestFamily,
        request_id: u32,
        offset: u32,
    ) -> Result<Vec<u8>, NodeError> {
        let snapshot = HostSnapshot::capture(self.host.as_ref());
        let aggregate = self.aggregate(true).await?;

        let mut players: Vec<Player> = snapshot.players.clone();
        let mut flags = 0u16;
        if !aggregate.is_empty() {
            flags |= v2::FLAG_RESPONSE_IS_NETWORK;
        }
        for network_player in &aggregate.network_players {
            players.push(Player::new(
                network_player.username.clone(),
                network_player.uuid,
            ));
        }

        players.sort_by_key(Player::sort_key);

        Ok(v2::build_players_response(
            family, request_id, flags, offset, &players,
        ))
    }

    // ── Status ──────────────────────────────────────────────────────────

    async fn handle_status(&self, data: &[u8], sender: SocketAddr) -> HandlerAction {
        if !self.allow(sender) {
            tracing::debug!("rate limited status packet from {sender}");
            return HandlerAction::Consume;
        }

        let Some(network) = &self.network else {
            return HandlerAction::Consume;
        };

        match network.process_status_update(data, sender).await {
            Some(ack) => HandlerAction::Respond(ack),
            None => HandlerAction::Consume,
        }
    }

    // ── Shared ──────────────────────────────────────────────────────────

    fn effective_motd(&self, snapshot: &HostSnapshot) -> String {
        self.custom_motd
            .clone()
            .unwrap_or_else(|| snapshot.motd.clone())
    }

    async fn aggregate(&self, include_players: bool) -> Result<NetworkAggregate, NetworkError> {
        match &self.network {
            Some(network) => network.get_aggregate(include_players).await,
            None => Ok(NetworkAggregate::empty()),
        }
    }
}
