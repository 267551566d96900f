//! Repository实现模块
//!
//! 包含所有数据访问层的具体实现

pub mod conversation_repository_impl;
pub mod deferred_repository_impl;
pub mod message_repository_impl;
pub mod user_repository_impl;

pub use conversation_repository_impl::*;
pub use deferred_repository_impl::*;
pub use message_repository_impl::*;
pub use user_repository_impl::*;
