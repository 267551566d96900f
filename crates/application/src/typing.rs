use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use domain::{ConversationId, ServerEvent, UserId, rooms};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::broadcaster::EventBroadcaster;
use crate::clock::Clock;
use crate::error::ApplicationError;

/// 输入开始后若无后续信号，超过该时长自动广播停止。
pub const TYPING_TIMEOUT: Duration = Duration::from_secs(3);

struct Inner {
    broadcaster: Arc<dyn EventBroadcaster>,
    clock: Arc<dyn Clock>,
    user_id: UserId,
    username: String,
    timers: Mutex<HashMap<ConversationId, JoinHandle<()>>>,
}

impl Inner {
    async fn broadcast_typing(&self, conversation_id: ConversationId) -> Result<(), ApplicationError> {
        let event = ServerEvent::UserTyping {
            user_id: self.user_id,
            username: self.username.clone(),
            conversation_id,
            timestamp: self.clock.now(),
        };
        self.broadcaster
            .to_room_except(&rooms::conversation(conversation_id), self.user_id, &event)
            .await?;
        Ok(())
    }

    async fn broadcast_stop(&self, conversation_id: ConversationId) -> Result<(), ApplicationError> {
        let event = ServerEvent::UserStopTyping {
            user_id: self.user_id,
            username: self.username.clone(),
            conversation_id,
            timestamp: self.clock.now(),
        };
        self.broadcaster
            .to_room_except(&rooms::conversation(conversation_id), self.user_id, &event)
            .await?;
        Ok(())
    }

    fn cancel_timer(&self, conversation_id: ConversationId) {
        if let Some(handle) = self.timers.lock().unwrap().remove(&conversation_id) {
            handle.abort();
        }
    }
}

/// 单连接的输入指示状态
///
/// 每个连接独立持有：按会话一个自停定时器。收到开始信号
/// 即广播并重置定时器；3 秒内无后续信号则自动广播停止。
/// 连接关闭时调用 [`TypingIndicator::shutdown`] 取消全部定时器。
pub struct TypingIndicator {
    inner: Arc<Inner>,
}

impl TypingIndicator {
    pub fn new(
        broadcaster: Arc<dyn EventBroadcaster>,
        clock: Arc<dyn Clock>,
        user_id: UserId,
        username: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                broadcaster,
                clock,
                user_id,
                username: username.into(),
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// 输入开始：广播并重置该会话的自停定时器。
    pub async fn started(&self, conversation_id: ConversationId) -> Result<(), ApplicationError> {
        self.inner.cancel_timer(conversation_id);
        self.inner.broadcast_typing(conversation_id).await?;

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(TYPING_TIMEOUT).await;
            inner.timers.lock().unwrap().remove(&conversation_id);
            if let Err(err) = inner.broadcast_stop(conversation_id).await {
                warn!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "failed to broadcast typing auto-stop"
                );
            }
        });
        self.inner
            .timers
            .lock()
            .unwrap()
            .insert(conversation_id, handle);
        Ok(())
    }

    /// 显式停止：取消定时器并立即广播。
    pub async fn stopped(&self, conversation_id: ConversationId) -> Result<(), ApplicationError> {
        self.inner.cancel_timer(conversation_id);
        self.inner.broadcast_stop(conversation_id).await
    }

    /// 连接关闭时取消全部未决定时器，不再广播。
    pub fn shutdown(&self) {
        let mut timers = self.inner.timers.lock().unwrap();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for TypingIndicator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::memory::RecordingBroadcaster;
    use crate::clock::SystemClock;

    fn indicator() -> (TypingIndicator, Arc<RecordingBroadcaster>, ConversationId) {
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let indicator = TypingIndicator::new(
            broadcaster.clone(),
            Arc::new(SystemClock),
            UserId::generate(),
            "alice",
        );
        (indicator, broadcaster, ConversationId::generate())
    }

    #[tokio::test(start_paused = true)]
    async fn typing_auto_stops_after_timeout() {
        let (indicator, broadcaster, conversation_id) = indicator();
        indicator.started(conversation_id).await.unwrap();
        assert_eq!(broadcaster.events_named("user_typing").len(), 1);
        assert!(broadcaster.events_named("user_stop_typing").is_empty());

        tokio::time::sleep(TYPING_TIMEOUT + Duration::from_millis(100)).await;
        assert_eq!(broadcaster.events_named("user_stop_typing").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_start_resets_the_timer() {
        let (indicator, broadcaster, conversation_id) = indicator();
        indicator.started(conversation_id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        indicator.started(conversation_id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        // 第一次的定时器已被重置，尚未自动停止。
        assert!(broadcaster.events_named("user_stop_typing").is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(broadcaster.events_named("user_stop_typing").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_cancels_the_timer() {
        let (indicator, broadcaster, conversation_id) = indicator();
        indicator.started(conversation_id).await.unwrap();
        indicator.stopped(conversation_id).await.unwrap();
        assert_eq!(broadcaster.events_named("user_stop_typing").len(), 1);

        tokio::time::sleep(TYPING_TIMEOUT * 2).await;
        // 定时器已取消，不会出现第二次停止广播。
        assert_eq!(broadcaster.events_named("user_stop_typing").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn conversations_have_independent_timers() {
        let (indicator, broadcaster, first) = indicator();
        let second = ConversationId::generate();

        indicator.started(first).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        indicator.started(second).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        // 第一个会话已自停，第二个尚未。
        assert_eq!(broadcaster.events_named("user_stop_typing").len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(broadcaster.events_named("user_stop_typing").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_timers_silently() {
        let (indicator, broadcaster, conversation_id) = indicator();
        indicator.started(conversation_id).await.unwrap();
        indicator.shutdown();

        tokio::time::sleep(TYPING_TIMEOUT * 2).await;
        assert!(broadcaster.events_named("user_stop_typing").is_empty());
    }
}
