//! 应用层服务
//!
//! 承载投递管线（计划 → 提升 → 发布 → 消费）与在线状态、
//! 输入指示的全部业务流程；对基础设施只依赖端口 trait。

pub mod auth;
pub mod broadcaster;
pub mod chat;
pub mod clock;
pub mod delivery;
pub mod error;
pub mod memory;
pub mod planner;
pub mod presence;
pub mod promoter;
pub mod queue;
pub mod typing;

pub use auth::TokenBlacklist;
pub use broadcaster::{BroadcastError, EventBroadcaster};
pub use chat::ChatService;
pub use clock::{Clock, SystemClock};
pub use delivery::{DeliveryOutcome, DeliveryProcessor};
pub use error::ApplicationError;
pub use planner::{MessagePlanner, PlannerReport};
pub use presence::{OnlineRoster, PresenceTracker};
pub use promoter::{PromoterReport, QueuePromoter};
pub use queue::{MessageQueue, QueueError};
pub use typing::TypingIndicator;
