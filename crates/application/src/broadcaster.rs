use async_trait::async_trait;
use domain::{ServerEvent, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 实时事件广播端口
///
/// 广播是 fire-and-forget：目标连接已断开或缓冲已满时
/// 帧被丢弃，不向调用方报告。`except` 变体用于不回送给
/// 触发事件的用户本人。
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    async fn to_room(&self, room: &str, event: &ServerEvent) -> Result<(), BroadcastError>;

    async fn to_room_except(
        &self,
        room: &str,
        except: UserId,
        event: &ServerEvent,
    ) -> Result<(), BroadcastError>;

    async fn to_all(&self, event: &ServerEvent) -> Result<(), BroadcastError>;

    async fn to_all_except(
        &self,
        except: UserId,
        event: &ServerEvent,
    ) -> Result<(), BroadcastError>;
}

/// 记录式广播器（测试用）。
pub mod memory {
    use super::*;
    use std::sync::Mutex;

    /// 广播目标
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Target {
        Room(String),
        RoomExcept(String, UserId),
        All,
        AllExcept(UserId),
    }

    #[derive(Default)]
    pub struct RecordingBroadcaster {
        sent: Mutex<Vec<(Target, ServerEvent)>>,
    }

    impl RecordingBroadcaster {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<(Target, ServerEvent)> {
            self.sent.lock().unwrap().clone()
        }

        /// 按事件名过滤已广播的事件。
        pub fn events_named(&self, name: &str) -> Vec<ServerEvent> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, event)| event.event_name() == name)
                .map(|(_, event)| event.clone())
                .collect()
        }
    }

    #[async_trait]
    impl EventBroadcaster for RecordingBroadcaster {
        async fn to_room(&self, room: &str, event: &ServerEvent) -> Result<(), BroadcastError> {
            self.sent
                .lock()
                .unwrap()
                .push((Target::Room(room.to_string()), event.clone()));
            Ok(())
        }

        async fn to_room_except(
            &self,
            room: &str,
            except: UserId,
            event: &ServerEvent,
        ) -> Result<(), BroadcastError> {
            self.sent
                .lock()
                .unwrap()
                .push((Target::RoomExcept(room.to_string(), except), event.clone()));
            Ok(())
        }

        async fn to_all(&self, event: &ServerEvent) -> Result<(), BroadcastError> {
            self.sent.lock().unwrap().push((Target::All, event.clone()));
            Ok(())
        }

        async fn to_all_except(
            &self,
            except: UserId,
            event: &ServerEvent,
        ) -> Result<(), BroadcastError> {
            self.sent
                .lock()
                .unwrap()
                .push((Target::AllExcept(except), event.clone()));
            Ok(())
        }
    }
}
