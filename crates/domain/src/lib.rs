//! 消息投递系统核心领域模型
//!
//! 包含用户、会话、聊天消息、延迟消息等核心实体，
//! 以及实时事件模型和仓储接口定义。

pub mod conversation;
pub mod deferred;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod message;
pub mod repositories;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use conversation::*;
pub use deferred::*;
pub use envelope::*;
pub use errors::*;
pub use events::*;
pub use message::*;
pub use repositories::*;
pub use user::*;
pub use value_objects::*;
