mod support;

use application::TokenBlacklist;
use chrono::{Duration, Utc};
use domain::{DeferredMessage, MessageContent};
use reqwest::{Client, StatusCode};
use tokio_tungstenite::connect_async;

use support::start_server;

#[tokio::test]
async fn health_endpoint_responds_ok() {
    let server = start_server().await;
    let response = Client::new()
        .get(format!("{}/health", server.http_base()))
        .send()
        .await
        .expect("health request");
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("health json");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn websocket_upgrade_requires_a_valid_token() {
    let server = start_server().await;

    let missing = connect_async(format!("ws://{}/ws", server.addr)).await;
    assert!(missing.is_err());

    let garbage = connect_async(format!("ws://{}/ws?token=not-a-jwt", server.addr)).await;
    assert!(garbage.is_err());
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let server = start_server().await;
    let token = server.token_for(&server.alice);

    let response = Client::new()
        .post(format!("{}/auth/logout", server.http_base()))
        .header("authorization", format!("Bearer {token}"))
        .send()
        .await
        .expect("logout request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(server.blacklist.is_blacklisted(&token).await.unwrap());

    // 吊销后的令牌不能再建立连接。
    let rejected = connect_async(format!("ws://{}/ws?token={token}", server.addr)).await;
    assert!(rejected.is_err());
}

#[tokio::test]
async fn manual_queue_trigger_promotes_due_records() {
    let server = start_server().await;
    let now = Utc::now();
    server.deferred.add(DeferredMessage::plan(
        MessageContent::new("Selam! Umarım iyisindir.").unwrap(),
        server.alice.id,
        server.bob.id,
        server.conversation.id,
        now - Duration::minutes(1),
        now - Duration::hours(1),
    ));

    let token = server.token_for(&server.bob);
    let response = Client::new()
        .post(format!("{}/system/queue/process", server.http_base()))
        .header("authorization", format!("Bearer {token}"))
        .send()
        .await
        .expect("queue trigger request");
    assert_eq!(response.status(), StatusCode::OK);

    let report: serde_json::Value = response.json().await.expect("report json");
    assert_eq!(report["claimed"], 1);
    assert_eq!(report["published"], 1);
    assert_eq!(report["failed"], 0);

    assert_eq!(server.queue.delivery_queue().len(), 1);

    // 未携带令牌的触发被拒绝。
    let unauthorized = Client::new()
        .post(format!("{}/system/queue/process", server.http_base()))
        .send()
        .await
        .expect("unauthorized request");
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
}
