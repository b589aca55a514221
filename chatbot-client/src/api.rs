//! Request/response client for the chat service

use chatbot_core::CompletionRequest;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// Shown when a login failure carries no `detail`
pub const LOGIN_FAILED: &str = "Login failed";
/// Shown when a registration failure carries no `detail`
pub const REGISTRATION_FAILED: &str = "Registration failed";

/// Issued by `POST /login`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// Client for the chat service HTTP API
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of `path` (which starts with `/`)
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange credentials for a bearer token
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<TokenResponse> {
        debug!("Logging in as {}", username);
        let response = self
            .client
            .post(self.endpoint("/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = read_detail(response).await;
            warn!(status = status.as_u16(), "Login rejected");
            return Err(ClientError::Auth(
                detail.unwrap_or_else(|| LOGIN_FAILED.to_string()),
            ));
        }

        Ok(response.json::<TokenResponse>().await?)
    }

    /// Create an account; does not log in
    pub async fn register(&self, username: &str, password: &str) -> ClientResult<RegisterResponse> {
        debug!("Registering {}", username);
        let response = self
            .client
            .post(self.endpoint("/register"))
            .json(&Credentials { username, password })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = read_detail(response).await;
            warn!(status = status.as_u16(), "Registration rejected");
            return Err(ClientError::Auth(
                detail.unwrap_or_else(|| REGISTRATION_FAILED.to_string()),
            ));
        }

        Ok(response.json::<RegisterResponse>().await?)
    }

    /// Probe `GET /healthz`
    pub async fn health(&self) -> ClientResult<HealthResponse> {
        let response = self.client.get(self.endpoint("/healthz")).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<HealthResponse>().await?)
    }

    /// Non-streaming completion via `POST /chat`
    pub async fn complete(&self, request: &CompletionRequest) -> ClientResult<String> {
        let mut builder = self.client.post(self.endpoint("/chat")).json(request);
        if let Some(token) = &request.credential {
            builder = builder.bearer_auth(token);
        }

        let response = ensure_success(builder.send().await?).await?;
        Ok(response.json::<ChatResponse>().await?.response)
    }

    /// Open `POST /chat/stream`, returning the response once headers arrive
    pub(crate) async fn open_stream(
        &self,
        request: &CompletionRequest,
        accept: &str,
    ) -> ClientResult<Response> {
        let mut builder = self
            .client
            .post(self.endpoint("/chat/stream"))
            .header(ACCEPT, accept)
            .json(request);
        if let Some(token) = &request.credential {
            builder = builder.bearer_auth(token);
        }

        ensure_success(builder.send().await?).await
    }
}

async fn ensure_success(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = read_detail(response).await.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    });
    Err(ClientError::Api {
        status: status.as_u16(),
        detail,
    })
}

async fn read_detail(response: Response) -> Option<String> {
    let body = response.text().await.ok()?;
    detail_from_body(&body)
}

/// `detail` field of an error body; validation errors arrive as JSON arrays
fn detail_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.trim().is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Whether an error means the credential was rejected
pub fn is_unauthorized(err: &ClientError) -> bool {
    matches!(err, ClientError::Api { status, .. } if *status == StatusCode::UNAUTHORIZED.as_u16())
}
