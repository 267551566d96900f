//! WebSocket 连接生命周期
//!
//! 每个连接：注册到连接表、加入个人房间、同步在线状态、
//! 持有自己的输入指示状态。入站帧按事件名分发到应用层服务，
//! 业务错误只回给本连接，不断开也不影响其他连接。

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use application::{EventBroadcaster, TypingIndicator};
use domain::{rooms, ConversationId, MessageContent, MessageId, ServerEvent, User};

use crate::state::AppState;

/// 客户端入站帧：`{"event": <名称>, "data": <载荷>}`。
#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationPayload {
    conversation_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagePayload {
    conversation_id: Uuid,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageReadPayload {
    message_id: Uuid,
}

pub(crate) async fn handle(socket: WebSocket, state: AppState, user: User) {
    let (connection_id, mut frames) = state.registry.register(user.id);
    state
        .registry
        .join_room(connection_id, &rooms::user(user.id));

    if let Err(err) = state.roster.connected(user.id, &user.username).await {
        error!(user_id = %user.id, error = %err, "failed to mark user online");
    }

    let broadcaster: Arc<dyn EventBroadcaster> = state.registry.clone();
    let typing = TypingIndicator::new(
        broadcaster,
        state.clock.clone(),
        user.id,
        user.username.clone(),
    );

    info!(user_id = %user.id, username = %user.username, "websocket connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let send_task = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                dispatch(&state, &typing, connection_id, &user, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(user_id = %user.id, error = %err, "websocket read failed");
                break;
            }
        }
    }

    typing.shutdown();
    state.registry.unregister(connection_id);
    send_task.abort();

    if let Err(err) = state.roster.disconnected(user.id, &user.username).await {
        error!(user_id = %user.id, error = %err, "failed to mark user offline");
    }
    info!(user_id = %user.id, "websocket disconnected");
}

async fn dispatch(
    state: &AppState,
    typing: &TypingIndicator,
    connection_id: Uuid,
    user: &User,
    raw: &str,
) {
    let frame: ClientFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(user_id = %user.id, error = %err, "malformed client frame");
            send_error(state, connection_id, "malformed frame");
            return;
        }
    };

    let result = match frame.event.as_str() {
        "join_room" => join_room(state, connection_id, frame.data),
        "send_message" => send_message(state, user, frame.data).await,
        "message_read" => message_read(state, user, frame.data).await,
        "typing_start" => typing_signal(typing, frame.data, true).await,
        "typing_stop" => typing_signal(typing, frame.data, false).await,
        "get_online_users" => online_users(state, connection_id).await,
        other => Err(format!("unknown event: {other}")),
    };

    if let Err(message) = result {
        debug!(user_id = %user.id, event = %frame.event, error = %message, "client event failed");
        send_error(state, connection_id, &message);
    }
}

/// 入房不做参与者校验：会话内事件本身都会再校验。
fn join_room(
    state: &AppState,
    connection_id: Uuid,
    data: serde_json::Value,
) -> Result<(), String> {
    let payload: ConversationPayload = parse(data)?;
    let conversation_id = ConversationId::from(payload.conversation_id);
    state
        .registry
        .join_room(connection_id, &rooms::conversation(conversation_id));
    Ok(())
}

async fn send_message(
    state: &AppState,
    user: &User,
    data: serde_json::Value,
) -> Result<(), String> {
    let payload: SendMessagePayload = parse(data)?;
    let content = MessageContent::new(payload.content).map_err(|e| e.to_string())?;
    state
        .chat_service
        .send_live_message(
            user.id,
            ConversationId::from(payload.conversation_id),
            content,
        )
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

async fn message_read(
    state: &AppState,
    user: &User,
    data: serde_json::Value,
) -> Result<(), String> {
    let payload: MessageReadPayload = parse(data)?;
    state
        .chat_service
        .mark_read(user.id, MessageId::from(payload.message_id))
        .await
        .map_err(|e| e.to_string())
}

async fn typing_signal(
    typing: &TypingIndicator,
    data: serde_json::Value,
    started: bool,
) -> Result<(), String> {
    let payload: ConversationPayload = parse(data)?;
    let conversation_id = ConversationId::from(payload.conversation_id);
    let result = if started {
        typing.started(conversation_id).await
    } else {
        typing.stopped(conversation_id).await
    };
    result.map_err(|e| e.to_string())
}

async fn online_users(state: &AppState, connection_id: Uuid) -> Result<(), String> {
    let event = state.roster.roster_event().await.map_err(|e| e.to_string())?;
    state
        .registry
        .send_to_connection(connection_id, &event)
        .map_err(|e| e.to_string())
}

fn parse<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, String> {
    serde_json::from_value(data).map_err(|e| format!("invalid payload: {e}"))
}

fn send_error(state: &AppState, connection_id: Uuid, message: &str) {
    let event = ServerEvent::Error {
        message: message.to_string(),
    };
    if let Err(err) = state.registry.send_to_connection(connection_id, &event) {
        warn!(error = %err, "failed to deliver error frame");
    }
}
