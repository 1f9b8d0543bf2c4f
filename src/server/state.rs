use axum::extract::FromRef;

use crate::review::RankingListManager;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedRankingManager = Arc<RankingListManager>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub ranking_manager: GuardedRankingManager,
}

impl ServerState {
    pub fn new(config: ServerConfig, ranking_manager: GuardedRankingManager) -> Self {
        ServerState {
            config,
            start_time: Instant::now(),
            ranking_manager,
        }
    }
}

impl FromRef<ServerState> for GuardedRankingManager {
    fn from_ref(input: &ServerState) -> Self {
        input.ranking_manager.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
