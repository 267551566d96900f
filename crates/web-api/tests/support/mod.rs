//! 端到端测试装配：内存仓储 + 真实路由，监听随机端口。
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use application::auth::memory::MemoryTokenBlacklist;
use application::memory::{
    MemoryConversationRepository, MemoryDeferredRepository, MemoryMessageRepository,
    MemoryUserRepository,
};
use application::presence::memory::MemoryPresenceTracker;
use application::queue::memory::MemoryMessageQueue;
use application::{ChatService, OnlineRoster, QueuePromoter, SystemClock};
use domain::{Conversation, User, UserId};
use web_api::{router, AppState, ConnectionRegistry, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub jwt: Arc<JwtService>,
    pub users: Arc<MemoryUserRepository>,
    pub messages: Arc<MemoryMessageRepository>,
    pub deferred: Arc<MemoryDeferredRepository>,
    pub queue: Arc<MemoryMessageQueue>,
    pub blacklist: Arc<MemoryTokenBlacklist>,
    pub alice: User,
    pub bob: User,
    pub conversation: Conversation,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn seeded_user(username: &str) -> User {
    User {
        id: UserId::generate(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        avatar: None,
        is_active: true,
        is_online: false,
        last_seen: None,
        created_at: Utc::now(),
    }
}

pub async fn start_server() -> TestServer {
    let now = Utc::now();
    let users = Arc::new(MemoryUserRepository::new());
    let alice = seeded_user("alice");
    let bob = seeded_user("bob");
    users.add(alice.clone());
    users.add(bob.clone());

    let conversations = Arc::new(MemoryConversationRepository::new());
    let conversation = conversations.seed_direct(alice.id, bob.id, now);
    let messages = Arc::new(MemoryMessageRepository::new());
    let deferred = Arc::new(MemoryDeferredRepository::new());
    let queue = Arc::new(MemoryMessageQueue::new());
    let blacklist = Arc::new(MemoryTokenBlacklist::new());

    let registry = Arc::new(ConnectionRegistry::new());
    let clock = Arc::new(SystemClock);
    let chat_service = Arc::new(ChatService::new(
        users.clone(),
        conversations.clone(),
        messages.clone(),
        registry.clone(),
        clock.clone(),
    ));
    let roster = Arc::new(OnlineRoster::new(
        Arc::new(MemoryPresenceTracker::new()),
        users.clone(),
        registry.clone(),
        clock.clone(),
    ));
    let promoter = Arc::new(QueuePromoter::new(
        deferred.clone(),
        queue.clone(),
        clock.clone(),
        100,
    ));
    let jwt = Arc::new(JwtService::new(JwtConfig {
        secret: "test-secret-key-with-at-least-32-chars".to_string(),
        expiration_hours: 1,
    }));

    let state = AppState {
        users: users.clone(),
        chat_service,
        roster,
        promoter,
        registry,
        jwt_service: jwt.clone(),
        token_blacklist: blacklist.clone(),
        clock,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        jwt,
        users,
        messages,
        deferred,
        queue,
        blacklist,
        alice,
        bob,
        conversation,
        shutdown: Some(shutdown_tx),
    }
}

impl TestServer {
    pub fn token_for(&self, user: &User) -> String {
        self.jwt
            .generate_token(user.id.0, &user.username)
            .expect("token")
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let (socket, _) = connect_async(format!("ws://{}/ws?token={token}", self.addr))
            .await
            .expect("websocket connect");
        socket
    }

    pub fn http_base(&self) -> String {
        format!("http://{}", self.addr)
    }
}

pub async fn send_event(socket: &mut WsClient, event: &str, data: serde_json::Value) {
    let frame = serde_json::json!({ "event": event, "data": data }).to_string();
    socket.send(Message::Text(frame.into())).await.expect("send frame");
}

/// 等待指定名称的事件，忽略途中其他事件。
pub async fn recv_event(socket: &mut WsClient, event: &str) -> serde_json::Value {
    let deadline = Duration::from_secs(3);
    loop {
        let message = timeout(deadline, socket.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {event}"))
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = message {
            let frame: serde_json::Value = serde_json::from_str(&text).expect("frame json");
            if frame["event"] == event {
                return frame["data"].clone();
            }
        }
    }
}

/// 断言在短窗口内没有指定事件到达。
pub async fn assert_no_event(socket: &mut WsClient, event: &str) {
    let window = Duration::from_millis(300);
    let result = timeout(window, async {
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Text(text) = message {
                let frame: serde_json::Value = serde_json::from_str(&text).expect("frame json");
                if frame["event"] == event {
                    return frame;
                }
            }
        }
        serde_json::Value::Null
    })
    .await;
    assert!(result.is_err(), "unexpected {event} frame received");
}
