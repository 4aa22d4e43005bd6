use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::{multipart, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::lifecycle::GenerationUpload;
use crate::auth::dto::AuthResponse;
use crate::generations::Generation;

/// A failed call as the client sees it: the HTTP status when there was a
/// response, and the message to show.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RequestFailure {
    pub status: Option<u16>,
    pub message: String,
}

impl RequestFailure {
    fn transport(e: reqwest::Error) -> Self {
        Self {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// 503, or a message that says the model is overloaded.
    pub fn is_overload(&self) -> bool {
        self.status == Some(StatusCode::SERVICE_UNAVAILABLE.as_u16())
            || self.message.to_lowercase().contains("model overloaded")
    }
}

/// What the generation lifecycle needs from the server.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn submit(&self, upload: &GenerationUpload) -> Result<Generation, RequestFailure>;
    async fn recent(&self, limit: u32) -> Result<Vec<Generation>, RequestFailure>;
}

#[derive(Serialize)]
struct CredentialsBody<'a> {
    email: &'a str,
    password: &'a str,
}

/// Thin reqwest wrapper over the REST API. Holds the bearer token once
/// signup or login succeeds.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().map(|t| (*t).clone()).unwrap_or_default()
    }

    /// Forget the session token.
    pub fn logout(&self) {
        self.set_token(None);
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<AuthResponse, RequestFailure> {
        self.authenticate("/auth/signup", email, password).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, RequestFailure> {
        self.authenticate("/auth/login", email, password).await
    }

    async fn authenticate(
        &self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, RequestFailure> {
        let resp = self
            .http
            .post(self.url(path))
            .json(&CredentialsBody { email, password })
            .send()
            .await
            .map_err(RequestFailure::transport)?;
        let auth: AuthResponse = read_json(resp).await?;
        self.set_token(Some(auth.token.clone()));
        debug!(user_id = auth.user.id, "authenticated");
        Ok(auth)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl GenerationTransport for ApiClient {
    async fn submit(&self, upload: &GenerationUpload) -> Result<Generation, RequestFailure> {
        let image = multipart::Part::bytes(upload.image.bytes.to_vec())
            .file_name(upload.image.file_name.clone())
            .mime_str(&upload.image.content_type)
            .map_err(RequestFailure::transport)?;
        let form = multipart::Form::new()
            .text("prompt", upload.prompt.clone())
            .text("style", upload.style.clone())
            .part("image", image);

        let resp = self
            .authorized(self.http.post(self.url("/generations")))
            .multipart(form)
            .send()
            .await
            .map_err(RequestFailure::transport)?;
        read_json(resp).await
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Generation>, RequestFailure> {
        let resp = self
            .authorized(self.http.get(self.url("/generations")))
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(RequestFailure::transport)?;
        let result = read_json(resp).await;
        if matches!(&result, Err(f) if f.status == Some(StatusCode::UNAUTHORIZED.as_u16())) {
            warn!("history refused the session token, signing out");
            self.logout();
        }
        result
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, RequestFailure> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        return Err(RequestFailure {
            status: Some(status.as_u16()),
            message: failure_message(status, &body),
        });
    }
    resp.json::<T>().await.map_err(RequestFailure::transport)
}

/// `message`, then `error`, then the bare status.
fn failure_message(status: StatusCode, body: &Value) -> String {
    ["message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::client::lifecycle::ImageFile;
    use crate::config::OverloadPolicy;
    use crate::state::testing;

    const TINY_PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    async fn spawn_server(dir: &std::path::Path, overload: OverloadPolicy) -> String {
        let config = testing::test_config(dir, overload);
        let state = testing::state_with(config).await;
        let app = crate::app::build_app(state);
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn upload(style: &str) -> GenerationUpload {
        GenerationUpload {
            prompt: "Red jacket".into(),
            style: style.into(),
            image: ImageFile {
                file_name: "look.png".into(),
                content_type: "image/png".into(),
                bytes: Bytes::from_static(TINY_PNG),
            },
        }
    }

    #[test]
    fn message_prefers_message_then_error_then_status() {
        let s = StatusCode::SERVICE_UNAVAILABLE;
        assert_eq!(
            failure_message(s, &json!({"message": "Model overloaded", "error": "x"})),
            "Model overloaded"
        );
        assert_eq!(
            failure_message(StatusCode::BAD_REQUEST, &json!({"error": "Invalid email"})),
            "Invalid email"
        );
        assert_eq!(failure_message(s, &Value::Null), "HTTP 503");
    }

    #[test]
    fn overload_detection() {
        let by_status = RequestFailure {
            status: Some(503),
            message: "HTTP 503".into(),
        };
        let by_text = RequestFailure {
            status: None,
            message: "upstream said: Model Overloaded".into(),
        };
        let other = RequestFailure {
            status: Some(400),
            message: "Invalid token".into(),
        };
        assert!(by_status.is_overload());
        assert!(by_text.is_overload());
        assert!(!other.is_overload());
    }

    #[tokio::test]
    async fn signup_submit_and_history_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path(), OverloadPolicy::Never).await;
        let client = ApiClient::new(format!("{}/", base));

        let auth = client.signup("http@test.com", "secret1").await.unwrap();
        assert_eq!(auth.user.email, "http@test.com");
        assert_eq!(client.token(), Some(auth.token.clone()));

        let g = client.submit(&upload("Minimal")).await.unwrap();
        assert_eq!(g.style, "Minimal");
        assert_eq!(g.status, "succeeded");

        let items = client.recent(5).await.unwrap();
        assert_eq!(items, vec![g]);
    }

    #[tokio::test]
    async fn server_errors_become_failures() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path(), OverloadPolicy::Always).await;
        let client = ApiClient::new(base.clone());

        let err = client.submit(&upload("Minimal")).await.unwrap_err();
        assert_eq!(err.status, Some(401));
        assert_eq!(err.message, "Missing Authorization header");

        client.signup("busy@test.com", "secret1").await.unwrap();
        let err = client.submit(&upload("Minimal")).await.unwrap_err();
        assert_eq!(err.status, Some(503));
        assert!(err.is_overload());

        let err = client.login("busy@test.com", "wrong-pass").await.unwrap_err();
        assert_eq!(err.status, Some(401));
        assert_eq!(err.message, "Invalid credentials");

        let stale = ApiClient::new(base).with_token("not-a-jwt");
        let err = stale.recent(5).await.unwrap_err();
        assert_eq!(err.message, "Invalid token");
        // a rejected token is dropped, so the next call goes out anonymous
        assert_eq!(stale.token(), None);
        let err = stale.recent(5).await.unwrap_err();
        assert_eq!(err.message, "Missing Authorization header");
    }

    #[tokio::test]
    async fn logout_forgets_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path(), OverloadPolicy::Never).await;
        let client = ApiClient::new(base);

        client.signup("leaving@test.com", "secret1").await.unwrap();
        assert!(client.recent(5).await.unwrap().is_empty());

        client.logout();
        assert_eq!(client.token(), None);
        let err = client.recent(5).await.unwrap_err();
        assert_eq!(err.status, Some(401));

        client.login("leaving@test.com", "secret1").await.unwrap();
        assert!(client.token().is_some());
        assert!(client.recent(5).await.is_ok());
    }
}
