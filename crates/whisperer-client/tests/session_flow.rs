use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use whisperer_client::storage::keys;
use whisperer_client::{
    ApiClient, AuthFlow, ClientResult, ExchangeOutcome, FileStore, IdentityClient,
    IdentityListener, LoginForm, PersistedStore, Route, RouteDecision, SessionStore, SkipReason,
    TokenValidator, failure_message, guard,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_json(id: i64) -> serde_json::Value {
    json!({
        "student_id": id,
        "email": format!("student{id}@uni.example"),
        "name": format!("Student {id}"),
    })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "token": "tok-9", "user": user_json(9) })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_survives_restart() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .and(header("Authorization", "Bearer tok-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user": user_json(9) })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("session.json");
    let api = Arc::new(ApiClient::new(&server.uri()));

    {
        let session = Arc::new(SessionStore::open(Arc::new(FileStore::new(&file))));
        let flow = AuthFlow::new(api.clone(), session.clone());
        let target = flow
            .login_with_credentials(&LoginForm::new("student9@uni.example", "pw"), Some(Route::Chat))
            .await
            .unwrap();
        assert_eq!(target, Route::Chat);
        assert_eq!(guard(Route::Chat, &session.snapshot()), RouteDecision::Render);
    }

    let storage = Arc::new(FileStore::new(&file));
    let session = SessionStore::open(storage.clone());
    assert_eq!(guard(Route::Chat, &session.snapshot()), RouteDecision::Loading);

    let confirmed = session.reconcile(&TokenValidator::new(api)).await;
    assert!(confirmed.is_authenticated());
    assert_eq!(confirmed.token(), Some("tok-9"));
    assert_eq!(storage.get(keys::SOURCE).unwrap().as_deref(), Some("local"));
}

#[tokio::test]
async fn test_revoked_token_signs_out_on_restart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Token has expired" })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("session.json");
    let storage = Arc::new(FileStore::new(&file));
    storage.set(keys::TOKEN, "stale").unwrap();
    storage
        .set(keys::USER, &user_json(9).to_string())
        .unwrap();

    let session = SessionStore::open(storage.clone());
    let validator = TokenValidator::new(Arc::new(ApiClient::new(&server.uri())));

    let first = session.reconcile(&validator).await;
    assert!(!first.is_authenticated());
    assert!(!first.is_loading());
    assert!(!file.exists());

    let second = session.reconcile(&validator).await;
    assert_eq!(first, second);
    assert_eq!(guard(Route::Chat, &second), RouteDecision::Redirect(Route::Login));
}

#[tokio::test]
async fn test_rejected_credentials_leave_no_trace() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid email or password" })),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("session.json");
    let session = Arc::new(SessionStore::open(Arc::new(FileStore::new(&file))));
    let flow = AuthFlow::new(Arc::new(ApiClient::new(&server.uri())), session.clone());

    let err = flow
        .login_with_credentials(&LoginForm::new("student9@uni.example", "wrong"), None)
        .await
        .unwrap_err();

    assert_eq!(failure_message(&err), "Invalid email or password");
    assert!(!session.snapshot().is_authenticated());
    assert!(!file.exists());
}

#[tokio::test]
async fn test_logout_tells_backend_and_clears_file() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .and(header("Authorization", "Bearer tok-9"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("session.json");
    let session = Arc::new(SessionStore::open(Arc::new(FileStore::new(&file))));
    let flow = AuthFlow::new(Arc::new(ApiClient::new(&server.uri())), session.clone());

    flow.login_with_credentials(&LoginForm::new("student9@uni.example", "pw"), None)
        .await
        .unwrap();
    assert!(file.exists());

    flow.logout().await.unwrap();
    assert!(!session.snapshot().is_authenticated());
    assert!(!file.exists());
}

struct CachedIdentity;

#[async_trait]
impl IdentityClient for CachedIdentity {
    async fn acquire_token_silent(&self) -> ClientResult<String> {
        Ok("id-token".to_string())
    }

    async fn login_interactive(&self) -> ClientResult<String> {
        Ok("id-token".to_string())
    }

    async fn clear_cache(&self) -> ClientResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_sso_recovers_from_exchange_flag_left_by_killed_process() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/azure-token"))
        .and(header("Authorization", "Bearer id-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "token": "ext-4", "user": user_json(4) })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("session.json");
    FileStore::new(&file)
        .set(keys::EXCHANGE_IN_PROGRESS, "true")
        .unwrap();

    let api = Arc::new(ApiClient::new(&server.uri()));
    let session = Arc::new(SessionStore::open(Arc::new(FileStore::new(&file))));
    AuthFlow::new(api.clone(), session.clone())
        .logout()
        .await
        .unwrap();

    let listener = IdentityListener::new(Arc::new(CachedIdentity), api, session.clone());
    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(listener.on_login_success().await);
    }

    assert!(matches!(outcomes[0], ExchangeOutcome::Authenticated { .. }));
    assert_eq!(
        outcomes[1],
        ExchangeOutcome::Skipped(SkipReason::AlreadyAuthenticated)
    );
    assert_eq!(session.snapshot().token(), Some("ext-4"));
    let reopened = FileStore::new(&file);
    assert_eq!(reopened.get(keys::TOKEN).unwrap().as_deref(), Some("ext-4"));
    assert!(!reopened.contains(keys::EXCHANGE_IN_PROGRESS).unwrap());
}
