use serde::{Deserialize, Serialize};

use crate::value_objects::{Timestamp, UserId};

/// 用户实体
///
/// 账号注册、密码等由认证协作方负责，这里只承载
/// 投递管线和在线状态同步需要的字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub is_online: bool,
    pub last_seen: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl User {
    pub fn display(&self) -> UserDisplay {
        UserDisplay {
            id: self.id,
            username: self.username.clone(),
            avatar: self.avatar.clone(),
            is_online: self.is_online,
            last_seen: self.last_seen,
        }
    }
}

/// 用户展示字段投影，用于在线列表和事件载荷。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDisplay {
    pub id: UserId,
    pub username: String,
    pub avatar: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<Timestamp>,
}

/// 计划任务只需要的最小用户投影。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUser {
    pub id: UserId,
    pub username: String,
}
