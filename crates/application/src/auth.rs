use async_trait::async_trait;

use crate::error::ApplicationError;

/// 令牌黑名单端口
///
/// 登出后的令牌在剩余有效期内仍然拒绝，条目到期后由存储自行清理。
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// 将令牌加入黑名单，`ttl_secs` 为令牌的剩余有效期。
    async fn blacklist(&self, token: &str, ttl_secs: u64) -> Result<(), ApplicationError>;

    async fn is_blacklisted(&self, token: &str) -> Result<bool, ApplicationError>;
}

/// 内存黑名单（测试用），不做 TTL 过期。
pub mod memory {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryTokenBlacklist {
        tokens: Mutex<HashSet<String>>,
    }

    impl MemoryTokenBlacklist {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl TokenBlacklist for MemoryTokenBlacklist {
        async fn blacklist(&self, token: &str, _ttl_secs: u64) -> Result<(), ApplicationError> {
            self.tokens.lock().unwrap().insert(token.to_string());
            Ok(())
        }

        async fn is_blacklisted(&self, token: &str) -> Result<bool, ApplicationError> {
            Ok(self.tokens.lock().unwrap().contains(token))
        }
    }
}
