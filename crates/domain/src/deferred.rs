use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{
    ConversationId, DeferredMessageId, MessageContent, Timestamp, UserId,
};

/// 延迟消息允许的最大重试次数（记录层面）。
pub const DEFERRED_MAX_RETRY: u32 = 5;

/// 计划好但尚未投递的消息记录
///
/// 生命周期：Planner 创建 → Promoter 置 `queued` → Consumer 置 `sent`。
/// 不变式：`sent` 蕴含 `queued`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredMessage {
    pub id: DeferredMessageId,
    pub content: MessageContent,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub conversation_id: ConversationId,
    pub send_date: Timestamp,
    pub queued: bool,
    pub sent: bool,
    pub queued_at: Option<Timestamp>,
    pub sent_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: Timestamp,
}

impl DeferredMessage {
    pub fn plan(
        content: MessageContent,
        sender_id: UserId,
        receiver_id: UserId,
        conversation_id: ConversationId,
        send_date: Timestamp,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: DeferredMessageId::generate(),
            content,
            sender_id,
            receiver_id,
            conversation_id,
            send_date,
            queued: false,
            sent: false,
            queued_at: None,
            sent_at: None,
            error_message: None,
            retry_count: 0,
            created_at,
        }
    }

    /// 记录是否已到发送时间且未被提升到队列。
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.send_date <= now && !self.queued && !self.sent
    }

    pub fn mark_queued(&mut self, at: Timestamp) {
        self.queued = true;
        self.queued_at = Some(at);
        self.error_message = None;
    }

    /// 投递完成。要求记录已经过提升（`sent ⇒ queued`）。
    pub fn mark_sent(&mut self, at: Timestamp) -> Result<(), DomainError> {
        if !self.queued {
            return Err(DomainError::business_rule_violation(
                "deferred message cannot be sent before it was queued",
            ));
        }
        self.sent = true;
        self.sent_at = Some(at);
        Ok(())
    }

    /// 发布失败：回退 queued 标记并记录错误，等待下一轮重选。
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.queued = false;
        self.queued_at = None;
        self.error_message = Some(error.into());
        self.retry_count = (self.retry_count + 1).min(DEFERRED_MAX_RETRY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn planned(send_offset_secs: i64) -> DeferredMessage {
        let now = Utc::now();
        DeferredMessage::plan(
            MessageContent::new("Hi").unwrap(),
            UserId::generate(),
            UserId::generate(),
            ConversationId::generate(),
            now + Duration::seconds(send_offset_secs),
            now,
        )
    }

    #[test]
    fn due_only_when_send_date_passed_and_unqueued() {
        let now = Utc::now();
        let mut record = planned(-1);
        assert!(record.is_due(now));

        record.mark_queued(now);
        assert!(!record.is_due(now));

        let future = planned(3600);
        assert!(!future.is_due(now));
    }

    #[test]
    fn sent_requires_queued() {
        let now = Utc::now();
        let mut record = planned(-1);
        assert!(record.mark_sent(now).is_err());

        record.mark_queued(now);
        assert!(record.mark_sent(now).is_ok());
        assert!(record.sent && record.queued);
        assert!(record.sent_at.is_some());
    }

    #[test]
    fn failure_releases_claim_and_counts_retry() {
        let now = Utc::now();
        let mut record = planned(-1);
        record.mark_queued(now);
        record.record_failure("broker unreachable");

        assert!(!record.queued);
        assert!(record.queued_at.is_none());
        assert_eq!(record.error_message.as_deref(), Some("broker unreachable"));
        assert_eq!(record.retry_count, 1);
        assert!(record.is_due(now));
    }

    #[test]
    fn retry_count_is_bounded() {
        let mut record = planned(-1);
        for _ in 0..10 {
            record.record_failure("boom");
        }
        assert_eq!(record.retry_count, DEFERRED_MAX_RETRY);
    }
}
