use std::sync::Arc;

use chrono::{Duration, Timelike};
use domain::{
    ActiveUser, ConversationRepository, DeferredMessage, DeferredMessageRepository,
    MessageContent, Timestamp, UserRepository,
};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::ApplicationError;

/// 自动消息的内容模板，随机选取。
pub const MESSAGE_TEMPLATES: [&str; 10] = [
    "Merhaba! Nasılsın?",
    "Günaydın! Bugün nasıl geçiyor?",
    "İyi akşamlar! Günün nasıl geçti?",
    "Selam! Ne yapıyorsun?",
    "Hey! Uzun zamandır görüşemedik.",
    "Merhaba! Yeni bir gün başladı.",
    "Selamlar! Bugün hava nasıl?",
    "Hey! Nasıl gidiyor hayat?",
    "Merhaba! Bugün planların neler?",
    "Selam! Umarım iyisindir.",
];

/// 一次计划运行的结果。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PlannerReport {
    pub active_users: usize,
    pub planned: usize,
    pub skipped: usize,
}

/// 每日消息计划器
///
/// 洗牌活跃用户后两两配对，为每对挑选模板与当日内的随机
/// 发送时间，解析会话后批量写入延迟消息表。
pub struct MessagePlanner {
    users: Arc<dyn UserRepository>,
    conversations: Arc<dyn ConversationRepository>,
    deferred: Arc<dyn DeferredMessageRepository>,
    clock: Arc<dyn Clock>,
}

impl MessagePlanner {
    pub fn new(
        users: Arc<dyn UserRepository>,
        conversations: Arc<dyn ConversationRepository>,
        deferred: Arc<dyn DeferredMessageRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            conversations,
            deferred,
            clock,
        }
    }

    /// 执行一次计划。用户不足两人时不产出任何记录。
    pub async fn plan_daily_messages(&self) -> Result<PlannerReport, ApplicationError> {
        let now = self.clock.now();
        let active = self.users.list_active().await?;
        if active.len() < 2 {
            warn!(active_users = active.len(), "not enough active users to plan messages");
            return Ok(PlannerReport {
                active_users: active.len(),
                planned: 0,
                skipped: 0,
            });
        }

        // 随机量全部提前抽取，之后的循环只做 IO。
        // rng 在 await 之前释放，保证 Future 满足 Send。
        let (pairs, draws): (Vec<(ActiveUser, ActiveUser)>, Vec<(usize, Timestamp)>) = {
            let mut rng = rand::rng();
            let pairs = pair_users(active.clone(), &mut rng);
            let draws = pairs
                .iter()
                .map(|_| {
                    (
                        rng.random_range(0..MESSAGE_TEMPLATES.len()),
                        random_send_time(now, &mut rng),
                    )
                })
                .collect();
            (pairs, draws)
        };

        let mut records = Vec::with_capacity(pairs.len());
        let mut skipped = 0usize;
        for ((sender, receiver), (template_idx, send_date)) in pairs.iter().zip(draws) {
            // 单对失败只跳过这一对，整轮继续。
            let conversation = match self
                .conversations
                .find_or_create_direct(sender.id, receiver.id, now)
                .await
            {
                Ok(conversation) => conversation,
                Err(err) => {
                    skipped += 1;
                    warn!(
                        sender = %sender.id,
                        receiver = %receiver.id,
                        error = %err,
                        "skipping pair: conversation resolution failed"
                    );
                    continue;
                }
            };
            let content = match MessageContent::new(MESSAGE_TEMPLATES[template_idx]) {
                Ok(content) => content,
                Err(err) => {
                    skipped += 1;
                    warn!(
                        sender = %sender.id,
                        receiver = %receiver.id,
                        error = %err,
                        "skipping pair: template rejected"
                    );
                    continue;
                }
            };
            records.push(DeferredMessage::plan(
                content,
                sender.id,
                receiver.id,
                conversation.id,
                send_date,
                now,
            ));
        }

        let inserted = self.deferred.bulk_insert(&records).await?;
        info!(
            active_users = active.len(),
            pairs = pairs.len(),
            planned = inserted,
            skipped,
            "daily message planning completed"
        );
        Ok(PlannerReport {
            active_users: active.len(),
            planned: inserted,
            skipped,
        })
    }
}

/// 洗牌后两两配对。奇数剩余的最后一人由洗牌后的第一人作为
/// 发送方再配一对，因此每次运行每个用户至少出现在一对中。
pub fn pair_users<R: Rng>(mut users: Vec<ActiveUser>, rng: &mut R) -> Vec<(ActiveUser, ActiveUser)> {
    users.shuffle(rng);
    let mut pairs: Vec<(ActiveUser, ActiveUser)> = users
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    if users.len() % 2 == 1 {
        if let (Some(first), Some(last)) = (users.first(), users.last()) {
            pairs.push((first.clone(), last.clone()));
        }
    }
    pairs
}

/// 在 `now` 所在日内随机挑一个发送时刻（0 点到 24 点之间）。
pub fn random_send_time<R: Rng>(now: Timestamp, rng: &mut R) -> Timestamp {
    let start_of_day = now
        .with_hour(0)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    start_of_day + Duration::seconds(rng.random_range(0..86_400))
}
