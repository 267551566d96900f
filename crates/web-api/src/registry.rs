//! WebSocket 连接注册表
//!
//! 持有全部活跃连接的发送端与房间成员关系，并以此实现
//! 应用层的事件广播端口。发送走无界通道，注册表本身不阻塞。

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use application::{BroadcastError, EventBroadcaster};
use domain::{ServerEvent, UserId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;
use uuid::Uuid;

struct Connection {
    user_id: UserId,
    sender: UnboundedSender<String>,
}

/// 连接注册表
///
/// 房间成员按连接而非按用户记录：同一用户多端登录时每个
/// 连接独立加入房间。断开的连接在 [`ConnectionRegistry::unregister`]
/// 时从所有房间移除。
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, Connection>>,
    rooms: RwLock<HashMap<String, HashSet<Uuid>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个连接，返回连接标识与该连接的出站帧流。
    pub fn register(&self, user_id: UserId) -> (Uuid, UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        self.connections
            .write()
            .unwrap()
            .insert(connection_id, Connection { user_id, sender });
        debug!(connection_id = %connection_id, user_id = %user_id, "connection registered");
        (connection_id, receiver)
    }

    /// 将连接加入房间。重复加入是幂等的。
    pub fn join_room(&self, connection_id: Uuid, room: &str) {
        self.rooms
            .write()
            .unwrap()
            .entry(room.to_string())
            .or_default()
            .insert(connection_id);
    }

    /// 注销连接并将其从所有房间移除。
    pub fn unregister(&self, connection_id: Uuid) {
        self.connections.write().unwrap().remove(&connection_id);
        let mut rooms = self.rooms.write().unwrap();
        rooms.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
        debug!(connection_id = %connection_id, "connection unregistered");
    }

    /// 只发给单个连接，用于请求方专属的回复与错误帧。
    pub fn send_to_connection(
        &self,
        connection_id: Uuid,
        event: &ServerEvent,
    ) -> Result<(), BroadcastError> {
        let frame = event
            .to_frame()
            .map_err(|e| BroadcastError::failed(e.to_string()))?;
        if let Some(connection) = self.connections.read().unwrap().get(&connection_id) {
            // 接收端已关闭说明连接正在拆除，丢弃即可。
            let _ = connection.sender.send(frame);
        }
        Ok(())
    }

    fn room_members(&self, room: &str) -> Vec<Uuid> {
        self.rooms
            .read()
            .unwrap()
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    fn send_frame(&self, targets: &[Uuid], except: Option<UserId>, frame: &str) {
        let connections = self.connections.read().unwrap();
        for connection_id in targets {
            let Some(connection) = connections.get(connection_id) else {
                continue;
            };
            if Some(connection.user_id) == except {
                continue;
            }
            let _ = connection.sender.send(frame.to_string());
        }
    }

    fn all_connections(&self) -> Vec<Uuid> {
        self.connections.read().unwrap().keys().copied().collect()
    }
}

#[async_trait]
impl EventBroadcaster for ConnectionRegistry {
    async fn to_room(&self, room: &str, event: &ServerEvent) -> Result<(), BroadcastError> {
        let frame = event
            .to_frame()
            .map_err(|e| BroadcastError::failed(e.to_string()))?;
        self.send_frame(&self.room_members(room), None, &frame);
        Ok(())
    }

    async fn to_room_except(
        &self,
        room: &str,
        except: UserId,
        event: &ServerEvent,
    ) -> Result<(), BroadcastError> {
        let frame = event
            .to_frame()
            .map_err(|e| BroadcastError::failed(e.to_string()))?;
        self.send_frame(&self.room_members(room), Some(except), &frame);
        Ok(())
    }

    async fn to_all(&self, event: &ServerEvent) -> Result<(), BroadcastError> {
        let frame = event
            .to_frame()
            .map_err(|e| BroadcastError::failed(e.to_string()))?;
        self.send_frame(&self.all_connections(), None, &frame);
        Ok(())
    }

    async fn to_all_except(
        &self,
        except: UserId,
        event: &ServerEvent,
    ) -> Result<(), BroadcastError> {
        let frame = event
            .to_frame()
            .map_err(|e| BroadcastError::failed(e.to_string()))?;
        self.send_frame(&self.all_connections(), Some(except), &frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{rooms, ConversationId};

    fn error_event() -> ServerEvent {
        ServerEvent::Error {
            message: "boom".into(),
        }
    }

    fn online_event(user_id: UserId) -> ServerEvent {
        ServerEvent::UserOnline {
            user_id,
            username: "alice".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn room_broadcast_reaches_only_members() {
        let registry = ConnectionRegistry::new();
        let (member_conn, mut member_rx) = registry.register(UserId::generate());
        let (_outside_conn, mut outside_rx) = registry.register(UserId::generate());

        let room = rooms::conversation(ConversationId::generate());
        registry.join_room(member_conn, &room);

        registry.to_room(&room, &error_event()).await.unwrap();

        let frame = member_rx.try_recv().unwrap();
        assert!(frame.contains("\"event\":\"error\""));
        assert!(outside_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn except_variant_skips_the_originating_user() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::generate();
        let bob = UserId::generate();
        let (alice_conn, mut alice_rx) = registry.register(alice);
        let (bob_conn, mut bob_rx) = registry.register(bob);

        let room = rooms::conversation(ConversationId::generate());
        registry.join_room(alice_conn, &room);
        registry.join_room(bob_conn, &room);

        registry
            .to_room_except(&room, alice, &online_event(alice))
            .await
            .unwrap();

        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_to_all_except_spares_self() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::generate();
        let (_alice_conn, mut alice_rx) = registry.register(alice);
        let (_bob_conn, mut bob_rx) = registry.register(UserId::generate());

        registry
            .to_all_except(alice, &online_event(alice))
            .await
            .unwrap();

        assert!(alice_rx.try_recv().is_err());
        let frame = bob_rx.try_recv().unwrap();
        assert!(frame.contains("\"event\":\"user_online\""));
    }

    #[tokio::test]
    async fn unregister_removes_connection_from_rooms() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = registry.register(UserId::generate());
        let room = rooms::conversation(ConversationId::generate());
        registry.join_room(conn, &room);

        registry.unregister(conn);
        registry.to_room(&room, &error_event()).await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_connection_targets_one_receiver() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = registry.register(UserId::generate());
        let (_other, mut other_rx) = registry.register(UserId::generate());

        registry.send_to_connection(conn, &error_event()).unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err());
    }
}
