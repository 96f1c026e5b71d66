use std::time::Duration;

use storefront_gateway::{
    AllowList, CancellationToken, Client, GatewayConfig, Identity, RequestDescriptor,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REFRESH_PATH: &str = "/auth/refresh";

fn test_client(server: &MockServer) -> Client<GatewayConfig> {
    Client::with_config(GatewayConfig::from_base(server.uri()))
}

fn unauthorized(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(serde_json::json!({ "message": message }))
}

async fn mount_refresh(server: &MockServer, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn non_401_failures_never_refresh() {
    let server = MockServer::start().await;

    for (p, status) in [("/forbidden", 403), ("/missing", 404), ("/boom", 500)] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&server)
            .await;
    }
    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let client = test_client(&server);
    for (p, status) in [("/forbidden", 403), ("/missing", 404), ("/boom", 500)] {
        let err = client.send(&RequestDescriptor::get(p)).await.unwrap_err();
        assert_eq!(err.http_status(), status);
    }
}

#[tokio::test]
async fn expired_session_refreshes_then_replays_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(unauthorized("expired"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    mount_refresh(&server, ResponseTemplate::new(200), 1).await;

    let client = test_client(&server);
    client
        .session()
        .set_cached_identity(Identity::new("u1", "customer"));

    let body = client
        .send(&RequestDescriptor::get("/orders"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(body[0]["id"], 1);
    assert_eq!(client.session().cached_user_id().as_deref(), Some("u1"));
}

#[tokio::test]
async fn failed_refresh_clears_session_and_returns_original_401() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(unauthorized("session expired"))
        .expect(1)
        .mount(&server)
        .await;

    mount_refresh(&server, ResponseTemplate::new(500), 1).await;

    let client = test_client(&server);
    client
        .session()
        .set_cached_identity(Identity::new("u1", "customer"));

    let err = client
        .send(&RequestDescriptor::get("/orders"))
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), 401);
    assert_eq!(err.message(), "session expired");
    assert!(client.session().identity().is_none());
}

#[tokio::test]
async fn refresh_401_does_not_recurse() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cart"))
        .respond_with(unauthorized("expired"))
        .expect(1)
        .mount(&server)
        .await;

    mount_refresh(&server, unauthorized("refresh token expired"), 1).await;

    let client = test_client(&server);
    let err = client
        .send(&RequestDescriptor::get("/cart"))
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), 401);
    assert_eq!(err.message(), "expired");
}

#[tokio::test]
async fn second_401_after_refresh_is_final() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(unauthorized("expired"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(unauthorized("still unauthorized"))
        .expect(1)
        .mount(&server)
        .await;

    mount_refresh(&server, ResponseTemplate::new(200), 1).await;

    let client = test_client(&server);
    let err = client
        .send(&RequestDescriptor::get("/orders"))
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), 401);
    assert_eq!(err.message(), "still unauthorized");
}

#[tokio::test]
async fn opted_out_call_is_not_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(unauthorized("bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let client = test_client(&server);
    let req = RequestDescriptor::post("/login")
        .service("auth")
        .without_refresh();
    let err = client.send(&req).await.unwrap_err();

    assert_eq!(err.message(), "bad credentials");
}

#[tokio::test]
async fn blocked_refresh_host_fails_the_refresh() {
    let gateway = MockServer::start().await;
    let auth = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(unauthorized("expired"))
        .expect(1)
        .mount(&gateway)
        .await;

    mount_refresh(&auth, ResponseTemplate::new(200), 0).await;

    let config = GatewayConfig::from_base(gateway.uri())
        .with_auth_base(format!("{}/auth", auth.uri()))
        .with_allow_list(AllowList::parse_lenient(&gateway.uri()));
    let client = Client::with_config(config);
    client
        .session()
        .set_cached_identity(Identity::new("u1", "customer"));

    let err = client
        .send(&RequestDescriptor::get("/orders"))
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), 401);
    assert!(client.session().identity().is_none());
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(unauthorized("expired"))
        .up_to_n_times(5)
        .expect(5)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(5)
        .mount(&server)
        .await;

    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_delay(Duration::from_millis(300)),
        1,
    )
    .await;

    let client = test_client(&server);
    let req = RequestDescriptor::get("/orders");
    let results = futures::future::join_all((0..5).map(|_| client.send(&req))).await;

    assert!(results.iter().all(Result::is_ok));
}

#[tokio::test]
async fn without_dedup_each_401_refreshes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(unauthorized("expired"))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(3)
        .mount(&server)
        .await;

    mount_refresh(
        &server,
        ResponseTemplate::new(200).set_delay(Duration::from_millis(300)),
        3,
    )
    .await;

    let client = test_client(&server).with_refresh_dedup(false);
    let req = RequestDescriptor::get("/orders");
    let results = futures::future::join_all((0..3).map(|_| client.send(&req))).await;

    assert!(results.iter().all(Result::is_ok));
}

#[tokio::test]
async fn explicit_refresh_failure_clears_session() {
    let server = MockServer::start().await;

    mount_refresh(&server, unauthorized("refresh token expired"), 1).await;

    let client = test_client(&server);
    client
        .session()
        .set_cached_identity(Identity::new("u1", "customer"));

    let err = client.refresh_session().await.unwrap_err();

    assert_eq!(err.http_status(), 401);
    assert_eq!(err.message(), "refresh token expired");
    assert!(client.session().identity().is_none());
}

#[tokio::test]
async fn cancelled_call_skips_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(unauthorized("expired").set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    mount_refresh(&server, ResponseTemplate::new(200), 0).await;

    let client = test_client(&server);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = client
        .send_cancellable(&RequestDescriptor::get("/orders"), &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.http_status(), 0);
    assert_eq!(err.code(), Some("NETWORK_ERROR"));
}

#[tokio::test]
async fn cancelled_replay_is_not_retried_again() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(unauthorized("expired"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(1)
        .mount(&server)
        .await;

    mount_refresh(&server, ResponseTemplate::new(200), 1).await;

    let client = test_client(&server);
    client
        .session()
        .set_cached_identity(Identity::new("u1", "customer"));
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let err = client
        .send_cancellable(&RequestDescriptor::get("/orders"), &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(client.session().identity().is_some());
}

#[tokio::test]
async fn cancelled_waiter_leaves_next_expiry_a_fresh_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(unauthorized("expired"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = client
        .send_cancellable(&RequestDescriptor::get("/orders"), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    tokio::time::sleep(Duration::from_secs(1)).await;

    client
        .session()
        .set_cached_identity(Identity::new("u1", "customer"));
    let err = client
        .send(&RequestDescriptor::get("/orders"))
        .await
        .unwrap_err();

    // A fresh refresh succeeded, so the replay's own 401 is what surfaces
    assert_eq!(err.http_status(), 401);
    assert_eq!(client.session().cached_user_id().as_deref(), Some("u1"));

    let refreshes = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == REFRESH_PATH)
        .count();
    assert_eq!(refreshes, 2);
}
