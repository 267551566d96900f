use application::{PresenceTracker, TokenBlacklist};
use domain::UserId;
use infrastructure::{create_redis_manager, RedisPresenceTracker, RedisTokenBlacklist};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::redis::Redis;

async fn setup_manager() -> (
    testcontainers::ContainerAsync<Redis>,
    redis::aio::ConnectionManager,
) {
    let node = Redis::default().start().await.expect("start redis");
    let port = node.get_host_port_ipv4(6379u16).await.expect("port");
    let manager = create_redis_manager(&format!("redis://127.0.0.1:{port}"))
        .await
        .expect("redis manager");
    (node, manager)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires local docker daemon"]
async fn presence_set_tracks_membership() {
    let (_node, manager) = setup_manager().await;
    let tracker = RedisPresenceTracker::new(manager);

    let alice = UserId::generate();
    let bob = UserId::generate();

    tracker.add(alice).await.expect("add alice");
    tracker.add(bob).await.expect("add bob");
    // 重复加入是幂等的
    tracker.add(alice).await.expect("re-add alice");

    assert!(tracker.contains(alice).await.expect("contains"));
    let members = tracker.members().await.expect("members");
    assert_eq!(members.len(), 2);

    tracker.remove(alice).await.expect("remove alice");
    assert!(!tracker.contains(alice).await.expect("contains after remove"));
    assert_eq!(tracker.members().await.expect("members").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires local docker daemon"]
async fn blacklisted_tokens_expire_with_their_ttl() {
    let (_node, manager) = setup_manager().await;
    let blacklist = RedisTokenBlacklist::new(manager);

    let token = "header.payload.signature";
    assert!(!blacklist.is_blacklisted(token).await.expect("check"));

    blacklist.blacklist(token, 2).await.expect("blacklist");
    assert!(blacklist.is_blacklisted(token).await.expect("check revoked"));

    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    assert!(!blacklist.is_blacklisted(token).await.expect("check expired"));
}
