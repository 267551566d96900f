use std::sync::Arc;

use domain::{DeferredMessageRepository, MessageEnvelope};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::queue::MessageQueue;

/// 一次提升运行的结果。
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PromoterReport {
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
}

/// 队列提升器
///
/// 周期性认领到期的延迟消息并发布到主投递队列。
/// 认领是条件更新：同一条记录只会被一次运行拿到，
/// 发布失败则释放认领，等待下一轮重选。
pub struct QueuePromoter {
    deferred: Arc<dyn DeferredMessageRepository>,
    queue: Arc<dyn MessageQueue>,
    clock: Arc<dyn Clock>,
    batch_size: i64,
}

impl QueuePromoter {
    pub fn new(
        deferred: Arc<dyn DeferredMessageRepository>,
        queue: Arc<dyn MessageQueue>,
        clock: Arc<dyn Clock>,
        batch_size: i64,
    ) -> Self {
        Self {
            deferred,
            queue,
            clock,
            batch_size,
        }
    }

    /// 执行一次提升。逐条发布，单条失败不影响其余记录。
    pub async fn promote_due_messages(&self) -> Result<PromoterReport, ApplicationError> {
        let now = self.clock.now();
        let due = self.deferred.claim_due(now, self.batch_size).await?;
        if due.is_empty() {
            debug!("no deferred messages due for promotion");
            return Ok(PromoterReport::default());
        }

        let mut report = PromoterReport {
            claimed: due.len(),
            ..Default::default()
        };

        for item in due {
            let envelope = MessageEnvelope::from_deferred(&item.record, now);
            match self.queue.publish(&envelope).await {
                Ok(()) => {
                    report.published += 1;
                    debug!(
                        deferred_id = %item.record.id,
                        sender = %item.sender_username,
                        receiver = %item.receiver_username,
                        "deferred message published to delivery queue"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    error!(
                        deferred_id = %item.record.id,
                        error = %err,
                        "failed to publish deferred message, releasing claim"
                    );
                    // 释放失败不再中断批次：记录保持已认领，
                    // 其余认领照常发布。
                    if let Err(release_err) = self
                        .deferred
                        .release_claim(item.record.id, &err.to_string())
                        .await
                    {
                        error!(
                            deferred_id = %item.record.id,
                            error = %release_err,
                            "failed to release claim, record stays queued"
                        );
                    }
                }
            }
        }

        info!(
            claimed = report.claimed,
            published = report.published,
            failed = report.failed,
            "queue promotion completed"
        );
        Ok(report)
    }
}
