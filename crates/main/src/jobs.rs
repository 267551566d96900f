//! 后台任务
//!
//! 每日计划与周期提升。任务体自行捕获并记录错误，
//! 单次运行失败不会终止循环。

use std::sync::Arc;
use std::time::Duration;

use application::{MessagePlanner, QueuePromoter};
use chrono::{Timelike, Utc};
use tracing::{error, info};

/// 每天在 `hour:00`（UTC）执行一次消息计划。
pub async fn run_planner_daily(planner: Arc<MessagePlanner>, hour: u32) {
    loop {
        let wait = Duration::from_secs(secs_until_hour(
            Utc::now().num_seconds_from_midnight() as u64,
            hour,
        ));
        info!(wait_secs = wait.as_secs(), hour, "daily planner scheduled");
        tokio::time::sleep(wait).await;

        match planner.plan_daily_messages().await {
            Ok(report) => info!(
                active_users = report.active_users,
                planned = report.planned,
                skipped = report.skipped,
                "daily planner run finished"
            ),
            Err(err) => error!(error = %err, "daily planner run failed"),
        }
    }
}

/// 周期性提升到期的延迟消息。
pub async fn run_promoter(promoter: Arc<QueuePromoter>, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = promoter.promote_due_messages().await {
            error!(error = %err, "queue promotion run failed");
        }
    }
}

/// 距离下一个 `hour:00` 的秒数；当前正处于该时刻时等待一整天。
fn secs_until_hour(current_secs: u64, hour: u32) -> u64 {
    let target = u64::from(hour.min(23)) * 3600;
    if current_secs < target {
        target - current_secs
    } else {
        86_400 - current_secs + target
    }
}
