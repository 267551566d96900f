mod support;

use serde_json::json;

use support::{assert_no_event, recv_event, send_event, start_server};

#[tokio::test]
async fn connect_and_disconnect_drive_presence_events() {
    let server = start_server().await;

    let mut alice = server.connect(&server.token_for(&server.alice)).await;
    let roster = recv_event(&mut alice, "online_users_update").await;
    assert_eq!(roster["count"], 1);

    let mut bob = server.connect(&server.token_for(&server.bob)).await;

    let online = recv_event(&mut alice, "user_online").await;
    assert_eq!(online["username"], "bob");
    let roster = recv_event(&mut alice, "online_users_update").await;
    assert_eq!(roster["count"], 2);

    // 上线广播不发给上线者本人。
    assert_no_event(&mut bob, "user_online").await;

    bob.close(None).await.expect("close");

    let offline = recv_event(&mut alice, "user_offline").await;
    assert_eq!(offline["username"], "bob");
    let roster = recv_event(&mut alice, "online_users_update").await;
    assert_eq!(roster["count"], 1);
}

#[tokio::test]
async fn online_users_list_goes_only_to_the_requester() {
    let server = start_server().await;

    let mut alice = server.connect(&server.token_for(&server.alice)).await;
    let mut bob = server.connect(&server.token_for(&server.bob)).await;

    send_event(&mut bob, "get_online_users", json!({})).await;
    let list = recv_event(&mut bob, "online_users_list").await;
    assert_eq!(list["count"], 2);
    let usernames: Vec<&str> = list["users"]
        .as_array()
        .expect("users array")
        .iter()
        .filter_map(|u| u["username"].as_str())
        .collect();
    assert!(usernames.contains(&"alice"));
    assert!(usernames.contains(&"bob"));

    assert_no_event(&mut alice, "online_users_list").await;
}
