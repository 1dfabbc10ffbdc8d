//! HTTP client for the Student Whisperer REST API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::ClientResult;
use crate::backend::{AuthBackend, UsageBackend};
use crate::chat::ChatMessage;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::forms::{LoginForm, RegisterForm};
use crate::types::{
    AdminTokenUsage, AuthGrant, ReportMonth, StudentCourses, TokenLimit, TokenUsageSnapshot, User,
};

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct MeResponse {
    user: User,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: ChatMessage,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_http(base_url, reqwest::Client::new())
    }

    pub fn with_http(base_url: &str, http: reqwest::Client) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Builds a client honouring the configured base URL and timeout.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http(&config.api_url, http))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let req = self
            .http
            .request(method, self.api_url(path))
            .header("Accept", "application/json");
        match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> ClientResult<T> {
        let resp = req
            .send()
            .await
            .map_err(|e| ClientError::network(format!("failed to connect to server: {e}")))?;
        handle_response(resp).await
    }

    /// `GET /api/health`. Returns the raw status document.
    pub async fn health(&self) -> ClientResult<Value> {
        self.send(self.request(reqwest::Method::GET, "health", None))
            .await
    }

    /// `POST /api/chat`.
    pub async fn send_chat(&self, token: &str, message: &str) -> ClientResult<ChatMessage> {
        let resp: ChatResponse = self
            .send(
                self.request(reqwest::Method::POST, "chat", Some(token))
                    .json(&json!({ "message": message })),
            )
            .await?;
        Ok(resp.response)
    }

    /// `GET /api/student/courses?email=`.
    pub async fn student_courses(&self, token: &str, email: &str) -> ClientResult<StudentCourses> {
        self.send(
            self.request(reqwest::Method::GET, "student/courses", Some(token))
                .query(&[("email", email)]),
        )
        .await
    }

    /// `GET /api/admin/token-usage?year=&month=`.
    pub async fn admin_token_usage(
        &self,
        token: &str,
        month: ReportMonth,
    ) -> ClientResult<AdminTokenUsage> {
        self.send(
            self.request(reqwest::Method::GET, "admin/token-usage", Some(token))
                .query(&[("year", month.year.to_string()), ("month", month.month.to_string())]),
        )
        .await
    }

    /// `GET /api/admin/token-limit`.
    pub async fn token_limit(&self, token: &str) -> ClientResult<TokenLimit> {
        self.send(self.request(reqwest::Method::GET, "admin/token-limit", Some(token)))
            .await
    }

    /// `POST /api/admin/token-limit`. Non-positive limits are rejected
    /// without contacting the backend.
    pub async fn set_token_limit(&self, token: &str, global_limit: i64) -> ClientResult<TokenLimit> {
        if global_limit <= 0 {
            return Err(ClientError::validation(
                "Please enter a valid token limit (positive number)",
            ));
        }
        self.send(
            self.request(reqwest::Method::POST, "admin/token-limit", Some(token))
                .json(&json!({ "global_limit": global_limit })),
        )
        .await
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn current_user(&self, token: &str) -> ClientResult<User> {
        let resp: MeResponse = self
            .send(self.request(reqwest::Method::GET, "me", Some(token)))
            .await?;
        Ok(resp.user)
    }

    async fn login(&self, form: &LoginForm) -> ClientResult<AuthGrant> {
        form.check()?;
        self.send(
            self.request(reqwest::Method::POST, "auth/login", None)
                .json(form),
        )
        .await
    }

    async fn register(&self, form: &RegisterForm) -> ClientResult<()> {
        form.check()?;
        let _: Value = self
            .send(
                self.request(reqwest::Method::POST, "auth/register", None)
                    .json(form),
            )
            .await?;
        Ok(())
    }

    async fn exchange_external_token(&self, id_token: &str) -> ClientResult<AuthGrant> {
        self.send(self.request(reqwest::Method::POST, "auth/azure-token", Some(id_token)))
            .await
    }

    async fn logout(&self, token: &str) -> ClientResult<()> {
        let resp = self
            .request(reqwest::Method::POST, "auth/logout", Some(token))
            .send()
            .await
            .map_err(|e| ClientError::network(format!("failed to connect to server: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }
}

#[async_trait]
impl UsageBackend for ApiClient {
    async fn token_usage(&self, token: &str) -> ClientResult<TokenUsageSnapshot> {
        self.send(self.request(reqwest::Method::GET, "token-usage", Some(token)))
            .await
    }
}

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> ClientResult<T> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| ClientError::network(format!("failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(error_for_status(status, &body));
    }

    let body = if body.trim().is_empty() { "null" } else { body.as_str() };
    serde_json::from_str(body)
        .map_err(|e| ClientError::decode(format!("failed to parse response JSON: {e}")))
}

/// Maps a non-success response onto the error taxonomy, preferring the
/// backend's `message` or `error` field as the message.
fn error_for_status(status: StatusCode, body: &str) -> ClientError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            ["message", "error"]
                .iter()
                .find_map(|k| json.get(k).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED => ClientError::unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => ClientError::quota_exceeded(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ClientError::validation(message)
        }
        other => ClientError::http(other.as_u16(), message),
    }
}
