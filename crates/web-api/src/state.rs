use std::sync::Arc;

use application::{ChatService, Clock, OnlineRoster, QueuePromoter, TokenBlacklist};
use domain::UserRepository;

use crate::auth::JwtService;
use crate::registry::ConnectionRegistry;

/// 路由层共享状态，所有服务在启动时显式装配。
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub chat_service: Arc<ChatService>,
    pub roster: Arc<OnlineRoster>,
    pub promoter: Arc<QueuePromoter>,
    pub registry: Arc<ConnectionRegistry>,
    pub jwt_service: Arc<JwtService>,
    pub token_blacklist: Arc<dyn TokenBlacklist>,
    pub clock: Arc<dyn Clock>,
}
