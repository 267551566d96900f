use std::sync::Arc;

use async_trait::async_trait;
use domain::{ServerEvent, UserDisplay, UserId, UserRepository};
use tracing::info;

use crate::broadcaster::EventBroadcaster;
use crate::clock::Clock;
use crate::error::ApplicationError;

/// 在线用户集合端口
///
/// 集合是多实例共享的唯一在线真相；用户行上的
/// `is_online` 标记只是回写的投影。
#[async_trait]
pub trait PresenceTracker: Send + Sync {
    async fn add(&self, user_id: UserId) -> Result<(), ApplicationError>;

    async fn remove(&self, user_id: UserId) -> Result<(), ApplicationError>;

    async fn members(&self) -> Result<Vec<UserId>, ApplicationError>;

    async fn contains(&self, user_id: UserId) -> Result<bool, ApplicationError>;
}

/// 在线状态编排
///
/// 连接与断开时维护在线集合、回写用户行、广播
/// `user_online` / `user_offline` 与全量名单更新。
pub struct OnlineRoster {
    tracker: Arc<dyn PresenceTracker>,
    users: Arc<dyn UserRepository>,
    broadcaster: Arc<dyn EventBroadcaster>,
    clock: Arc<dyn Clock>,
}

impl OnlineRoster {
    pub fn new(
        tracker: Arc<dyn PresenceTracker>,
        users: Arc<dyn UserRepository>,
        broadcaster: Arc<dyn EventBroadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            users,
            broadcaster,
            clock,
        }
    }

    /// 用户连接：加入在线集合并向其他用户广播上线。
    pub async fn connected(&self, user_id: UserId, username: &str) -> Result<(), ApplicationError> {
        let now = self.clock.now();
        self.tracker.add(user_id).await?;
        self.users.set_online(user_id, true, now).await?;

        self.broadcaster
            .to_all_except(
                user_id,
                &ServerEvent::UserOnline {
                    user_id,
                    username: username.to_string(),
                    timestamp: now,
                },
            )
            .await?;
        self.broadcast_roster_update().await?;

        info!(user_id = %user_id, username, "user connected");
        Ok(())
    }

    /// 用户断开：移出在线集合并向其他用户广播下线。
    pub async fn disconnected(
        &self,
        user_id: UserId,
        username: &str,
    ) -> Result<(), ApplicationError> {
        let now = self.clock.now();
        self.tracker.remove(user_id).await?;
        self.users.set_online(user_id, false, now).await?;

        self.broadcaster
            .to_all_except(
                user_id,
                &ServerEvent::UserOffline {
                    user_id,
                    username: username.to_string(),
                    timestamp: now,
                },
            )
            .await?;
        self.broadcast_roster_update().await?;

        info!(user_id = %user_id, username, "user disconnected");
        Ok(())
    }

    /// 当前在线名单的展示投影，顺序不保证。
    pub async fn online_users(&self) -> Result<Vec<UserDisplay>, ApplicationError> {
        let ids = self.tracker.members().await?;
        Ok(self.users.find_displays(&ids).await?)
    }

    /// 请求方专用的全量名单事件。
    pub async fn roster_event(&self) -> Result<ServerEvent, ApplicationError> {
        let users = self.online_users().await?;
        Ok(ServerEvent::OnlineUsersList {
            count: users.len(),
            users,
            timestamp: self.clock.now(),
        })
    }

    async fn broadcast_roster_update(&self) -> Result<(), ApplicationError> {
        let users = self.online_users().await?;
        self.broadcaster
            .to_all(&ServerEvent::OnlineUsersUpdate {
                count: users.len(),
                users,
                timestamp: self.clock.now(),
            })
            .await?;
        Ok(())
    }
}

/// 内存在线集合（测试用）。
pub mod memory {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryPresenceTracker {
        online: Mutex<HashSet<UserId>>,
    }

    impl MemoryPresenceTracker {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl PresenceTracker for MemoryPresenceTracker {
        async fn add(&self, user_id: UserId) -> Result<(), ApplicationError> {
            self.online.lock().unwrap().insert(user_id);
            Ok(())
        }

        async fn remove(&self, user_id: UserId) -> Result<(), ApplicationError> {
            self.online.lock().unwrap().remove(&user_id);
            Ok(())
        }

        async fn members(&self) -> Result<Vec<UserId>, ApplicationError> {
            Ok(self.online.lock().unwrap().iter().copied().collect())
        }

        async fn contains(&self, user_id: UserId) -> Result<bool, ApplicationError> {
            Ok(self.online.lock().unwrap().contains(&user_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryPresenceTracker;
    use super::*;
    use crate::broadcaster::memory::{RecordingBroadcaster, Target};
    use crate::clock::fixed::FixedClock;
    use crate::memory::MemoryUserRepository;
    use chrono::Utc;
    use domain::User;

    fn roster() -> (OnlineRoster, Arc<RecordingBroadcaster>, User) {
        let now = Utc::now();
        let user = User {
            id: UserId::generate(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            avatar: None,
            is_active: true,
            is_online: false,
            last_seen: None,
            created_at: now,
        };
        let users = Arc::new(MemoryUserRepository::new());
        users.add(user.clone());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let roster = OnlineRoster::new(
            Arc::new(MemoryPresenceTracker::new()),
            users,
            broadcaster.clone(),
            Arc::new(FixedClock::new(now)),
        );
        (roster, broadcaster, user)
    }

    #[tokio::test]
    async fn connect_announces_and_updates_roster() {
        let (roster, broadcaster, user) = roster();
        roster.connected(user.id, &user.username).await.unwrap();

        let sent = broadcaster.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, Target::AllExcept(user.id));
        assert_eq!(sent[0].1.event_name(), "user_online");
        assert_eq!(sent[1].0, Target::All);
        assert_eq!(sent[1].1.event_name(), "online_users_update");

        let online = roster.online_users().await.unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].username, "alice");
    }

    #[tokio::test]
    async fn disconnect_announces_offline_and_empties_roster() {
        let (roster, broadcaster, user) = roster();
        roster.connected(user.id, &user.username).await.unwrap();
        roster.disconnected(user.id, &user.username).await.unwrap();

        let offline = broadcaster.events_named("user_offline");
        assert_eq!(offline.len(), 1);

        assert!(roster.online_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn roster_event_carries_current_members() {
        let (roster, _, user) = roster();
        roster.connected(user.id, &user.username).await.unwrap();

        let event = roster.roster_event().await.unwrap();
        match event {
            ServerEvent::OnlineUsersList { users, count, .. } => {
                assert_eq!(count, 1);
                assert_eq!(users[0].username, "alice");
            }
            other => panic!("unexpected event {}", other.event_name()),
        }
    }
}
