use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use stash_auth::{
    app::build_router,
    config::Config,
    runtime,
    token::{AuthMode, TokenClaims, TokenCodec},
};
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header as header_matcher, method, path, query_param},
};

const TOKEN_KEY: &str = "0123456789abcdef0123456789abcdef";
const PACKAGE_PATH: &str = "/my-test-module";
const REPO_PATH: &str = "/projects/myproject/repos/myrepo";
const PERMISSIONS_PATH: &str = "/rest/api/1.0/projects/myproject/repos/myrepo/permissions/users";

fn test_config(stash_url: &str, front_door_url: &str, read_policy: &str) -> Config {
    let mut cfg = Config::defaults();
    cfg.stash.host = stash_url.trim_end_matches('/').to_string();
    cfg.stash.user = "npm-repository-admin".to_string();
    cfg.stash.password = "service-secret".to_string();
    cfg.stash.token_encryption_key = TOKEN_KEY.to_string();
    cfg.stash.read_authorization_policy = read_policy.to_string();
    cfg.front_door.host = front_door_url.trim_end_matches('/').to_string();
    cfg.front_door.shared_fetch_secret = "fetch-secret".to_string();
    cfg
}

fn app(cfg: &Config) -> axum::Router {
    build_router(runtime::build_state(cfg).expect("state"))
}

fn service_basic_auth() -> String {
    format!(
        "Basic {}",
        B64.encode("npm-repository-admin:service-secret")
    )
}

fn mint_token(username: &str, expires_at: Option<i64>) -> String {
    TokenCodec::new(TOKEN_KEY)
        .encode(&TokenClaims {
            mode: AuthMode::HttpBasic,
            username: username.to_string(),
            nonce: String::new(),
            expires_at,
        })
        .expect("mint token")
}

fn fresh_token(username: &str) -> String {
    mint_token(
        username,
        Some(chrono::Utc::now().timestamp_millis() + 3_600_000),
    )
}

fn manifest(repo_url: &str) -> Value {
    json!({
        "_id": "my-test-module",
        "dist-tags": { "latest": "0.0.1" },
        "versions": {
            "0.0.1": {
                "name": "my-test-module",
                "version": "0.0.1",
                "repository": { "type": "git", "url": repo_url }
            }
        }
    })
}

fn authorize_request(http_method: &str, token: &str, body: Option<Value>) -> Value {
    json!({
        "path": PACKAGE_PATH,
        "method": http_method,
        "headers": { "authorization": format!("Bearer {token}") },
        "body": body
    })
}

fn permission_page(grants: &[(&str, bool, &str)]) -> Value {
    let values = grants
        .iter()
        .map(|(name, active, permission)| {
            json!({
                "permission": permission,
                "user": {
                    "name": name,
                    "active": active,
                    "displayName": name,
                    "slug": name,
                    "id": 3177,
                    "type": "NORMAL",
                    "emailAddress": format!("{name}@nodomain.com")
                }
            })
        })
        .collect::<Vec<_>>();
    json!({
        "isLastPage": true,
        "limit": 25,
        "start": 0,
        "size": values.len(),
        "values": values
    })
}

async fn mount_front_door_miss(front_door: &MockServer) {
    Mock::given(method("GET"))
        .and(path(PACKAGE_PATH))
        .and(query_param("sharedFetchSecret", "fetch-secret"))
        .respond_with(ResponseTemplate::new(404))
        .mount(front_door)
        .await;
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("body")))
        .expect("request")
}

async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn publish_with_repo_write_permission_is_allowed() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .and(query_param("filter", "testuser"))
        .and(header_matcher("Authorization", service_basic_auth().as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(permission_page(&[("testuser", true, "REPO_WRITE")])),
        )
        .expect(1)
        .mount(&stash)
        .await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = authorize_request("PUT", &fresh_token("testuser"), Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "allowed": true }));
}

#[tokio::test]
async fn publish_with_only_read_permission_is_denied() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(permission_page(&[("testuser", true, "REPO_READ")])),
        )
        .mount(&stash)
        .await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = authorize_request("PUT", &fresh_token("testuser"), Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "allowed": false }));
}

#[tokio::test]
async fn read_with_repo_read_permission_is_allowed() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .and(query_param("filter", "testuser"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(permission_page(&[("testuser", true, "REPO_READ")])),
        )
        .mount(&stash)
        .await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = authorize_request("GET", &fresh_token("testuser"), Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "allowed": true }));
}

#[tokio::test]
async fn inactive_grant_holder_is_denied() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(permission_page(&[("testuser", false, "REPO_ADMIN")])),
        )
        .mount(&stash)
        .await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = authorize_request("PUT", &fresh_token("testuser"), Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "allowed": false }));
}

#[tokio::test]
async fn prefix_filter_match_for_another_user_is_denied() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;
    // Stash's filter parameter is a prefix match; "testuser2" comes back for
    // "testuser" but must not count.
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .and(query_param("filter", "testuser"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(permission_page(&[("testuser2", true, "REPO_ADMIN")])),
        )
        .mount(&stash)
        .await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = authorize_request("PUT", &fresh_token("testuser"), Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "allowed": false }));
}

#[tokio::test]
async fn stash_error_envelope_is_passed_through_as_bad_gateway() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errors": [{ "context": null, "message": "Repository Not Found", "exceptionName": null }]
        })))
        .mount(&stash)
        .await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = authorize_request("PUT", &fresh_token("testuser"), Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(resp).await["error"], "Repository Not Found");
}

#[tokio::test]
async fn permission_failure_without_a_body_gets_a_generic_message() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&stash)
        .await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = authorize_request("PUT", &fresh_token("testuser"), Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        body_json(resp).await["error"],
        "no valid response data received to a failed request"
    );
}

#[tokio::test]
async fn repository_on_another_host_is_rejected_before_any_stash_call() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("http://non-localhost{REPO_PATH}.git");
    let request = authorize_request("PUT", &fresh_token("testuser"), Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"],
        "repository host mismatch (127.0.0.1 != non-localhost)"
    );

    let requests = stash.received_requests().await.expect("requests");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn non_git_repository_type_is_rejected() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let body = json!({
        "_id": "my-test-module",
        "dist-tags": { "latest": "0.0.1" },
        "versions": {
            "0.0.1": {
                "name": "my-test-module",
                "version": "0.0.1",
                "repository": { "type": "svn", "url": format!("{}{REPO_PATH}", stash.uri()) }
            }
        }
    });
    let request = authorize_request("PUT", &fresh_token("testuser"), Some(body));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"],
        "only git repositories are supported, ensure that repository.type is set to 'git'"
    );
}

#[tokio::test]
async fn authenticated_read_policy_skips_the_permission_lookup() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;

    let app = app(&test_config(&stash.uri(), &front_door.uri(), "authenticated"));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = authorize_request("GET", &fresh_token("testuser"), Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "allowed": true }));

    let requests = stash.received_requests().await.expect("requests");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn authenticated_read_policy_rejects_a_garbage_token() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;

    let app = app(&test_config(&stash.uri(), &front_door.uri(), "authenticated"));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = authorize_request("GET", "not-a-token", Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(resp).await["error"],
        "token not valid, relogin required"
    );
}

#[tokio::test]
async fn authenticated_read_policy_rejects_an_expired_token() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;

    let app = app(&test_config(&stash.uri(), &front_door.uri(), "authenticated"));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let expired = mint_token("testuser", Some(0));
    let request = authorize_request("GET", &expired, Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(resp).await["error"],
        "token not valid, relogin required"
    );
}

#[tokio::test]
async fn expired_token_under_permission_policy_is_denied_without_a_lookup() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let expired = mint_token("testuser", Some(0));
    let request = authorize_request("PUT", &expired, Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "allowed": false }));

    let requests = stash.received_requests().await.expect("requests");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn front_door_descriptor_wins_over_the_request_body() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    // An earlier publish recorded the package against myrepo; the inbound
    // body claims a different repository.
    let recorded_repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    Mock::given(method("GET"))
        .and(path(PACKAGE_PATH))
        .and(query_param("sharedFetchSecret", "fetch-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest(&recorded_repo_url)))
        .mount(&front_door)
        .await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .and(query_param("filter", "testuser"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(permission_page(&[("testuser", true, "REPO_ADMIN")])),
        )
        .expect(1)
        .mount(&stash)
        .await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let claimed_repo_url = format!("{}/projects/other/repos/otherrepo.git", stash.uri());
    let request = authorize_request(
        "PUT",
        &fresh_token("testuser"),
        Some(manifest(&claimed_repo_url)),
    );
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "allowed": true }));
}

#[tokio::test]
async fn missing_authorization_header_is_rejected() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let request = json!({
        "path": PACKAGE_PATH,
        "method": "PUT",
        "headers": {},
        "body": null
    });
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"],
        "missing credentials data from request"
    );
}

#[tokio::test]
async fn missing_package_path_is_rejected() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let request = json!({
        "method": "PUT",
        "headers": { "authorization": format!("Bearer {}", fresh_token("testuser")) },
        "body": null
    });
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"],
        "missing package path from request"
    );
}

#[tokio::test]
async fn first_publish_without_a_body_is_rejected() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let request = json!({
        "path": PACKAGE_PATH,
        "method": "PUT",
        "headers": { "authorization": format!("Bearer {}", fresh_token("testuser")) }
    });
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"],
        "missing package data from request"
    );
}

#[tokio::test]
async fn front_door_failure_is_a_bad_gateway() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PACKAGE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&front_door)
        .await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = authorize_request("PUT", &fresh_token("testuser"), Some(manifest(&repo_url)));
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        body_json(resp).await["error"],
        "invalid response from front door to query for package /my-test-module: 500"
    );
}

#[tokio::test]
async fn query_string_is_stripped_before_the_front_door_lookup() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;
    mount_front_door_miss(&front_door).await;
    Mock::given(method("GET"))
        .and(path(PERMISSIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(permission_page(&[("testuser", true, "REPO_WRITE")])),
        )
        .mount(&stash)
        .await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let repo_url = format!("{}{REPO_PATH}.git", stash.uri());
    let request = json!({
        "path": format!("{PACKAGE_PATH}?write=true"),
        "method": "PUT",
        "headers": { "authorization": format!("Bearer {}", fresh_token("testuser")) },
        "body": manifest(&repo_url)
    });
    let resp = app
        .oneshot(post_json("/authorize", &request))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "allowed": true }));
}

#[tokio::test]
async fn ping_answers_with_an_empty_object() {
    let stash = MockServer::start().await;
    let front_door = MockServer::start().await;

    let app = app(&test_config(
        &stash.uri(),
        &front_door.uri(),
        "repository-read-permission",
    ));
    let resp = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/-/ping")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({}));
}
