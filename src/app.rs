use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::state::AppState;
use crate::storage::PUBLIC_PREFIX;
use crate::{auth, generations};

pub fn build_app(state: AppState) -> Router {
    let uploads = ServeDir::new(state.config.upload_dir.clone());

    Router::new()
        .route("/", get(health))
        .merge(auth::router())
        .merge(generations::router())
        .nest_service(&format!("/{}", PUBLIC_PREFIX), uploads)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::config::OverloadPolicy;
    use crate::state::testing;

    const BOUNDARY: &str = "----style-studio-test-boundary";
    const TINY_PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    async fn app_with(upload_dir: &Path, overload: OverloadPolicy) -> Router {
        let state = testing::state_with(testing::test_config(upload_dir, overload)).await;
        build_app(state)
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_body(prompt: Option<&str>, style: Option<&str>, image: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in [("prompt", prompt), ("style", style)] {
            if let Some(value) = value {
                body.extend_from_slice(
                    format!(
                        "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                        BOUNDARY, name, value
                    )
                    .as_bytes(),
                );
            }
        }
        if let Some((content_type, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"tiny.png\"\r\nContent-Type: {}\r\n\r\n",
                    BOUNDARY, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn generation_post(token: Option<&str>, body: Vec<u8>) -> Request<Body> {
        let mut req = Request::post("/generations").header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        req.body(Body::from(body)).unwrap()
    }

    fn history_get(token: &str, query: &str) -> Request<Body> {
        Request::get(format!("/generations{}", query))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn signup_token(app: &Router, email: &str) -> String {
        let resp = send(
            app,
            json_post("/auth/signup", json!({ "email": email, "password": "secret123" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp).await["token"].as_str().unwrap().to_string()
    }

    fn upload_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn health_check() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;
        let resp = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn signup_returns_token_and_public_user() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;

        let resp = send(
            &app,
            json_post("/auth/signup", json!({ "email": "a@test.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        assert!(!body["token"].as_str().unwrap().is_empty());
        assert_eq!(body["user"]["email"], "a@test.com");
        assert!(body["user"]["id"].is_i64());
        assert!(body["user"]["createdAt"].is_string());
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn signup_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;

        let resp = send(
            &app,
            json_post("/auth/signup", json!({ "email": "nope", "password": "123" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            json!({ "error": "Invalid email, Password must be at least 6 characters" })
        );

        let resp = send(&app, json_post("/auth/signup", json!({ "email": "a@test.com" }))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts_and_first_token_still_works() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;
        let token = signup_token(&app, "dup@test.com").await;

        let resp = send(
            &app,
            json_post("/auth/signup", json!({ "email": "dup@test.com", "password": "another1" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(body_json(resp).await["error"].is_string());

        let resp = send(&app, history_get(&token, "")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_failures_share_payload() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;
        signup_token(&app, "known@test.com").await;

        let wrong = send(
            &app,
            json_post("/auth/login", json!({ "email": "known@test.com", "password": "wrong-pass" })),
        )
        .await;
        let unknown = send(
            &app,
            json_post("/auth/login", json!({ "email": "ghost@test.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        let wrong = body_json(wrong).await;
        assert_eq!(wrong, json!({ "error": "Invalid credentials" }));
        assert_eq!(wrong, body_json(unknown).await);

        let ok = send(
            &app,
            json_post("/auth/login", json!({ "email": "known@test.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(body_json(ok).await["user"]["email"], "known@test.com");
    }

    #[tokio::test]
    async fn generation_requires_auth_header() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;

        let body = multipart_body(Some("Red jacket"), Some("Streetwear"), Some(("image/png", TINY_PNG)));
        let resp = send(&app, generation_post(None, body)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(resp).await,
            json!({ "error": "Missing Authorization header" })
        );

        let resp = send(&app, Request::get("/generations").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(upload_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn bad_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;

        let resp = send(&app, history_get("garbage", "")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await, json!({ "error": "Invalid token" }));
    }

    #[tokio::test]
    async fn generation_without_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;
        let token = signup_token(&app, "noimg@test.com").await;

        let body = multipart_body(Some("Red jacket"), Some("Streetwear"), None);
        let resp = send(&app, generation_post(Some(&token), body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await, json!({ "error": "Image upload is required" }));

        let history = body_json(send(&app, history_get(&token, "")).await).await;
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn generation_with_unknown_style_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;
        let token = signup_token(&app, "casual@test.com").await;

        let body = multipart_body(Some("Red jacket"), Some("Casual"), Some(("image/png", TINY_PNG)));
        let resp = send(&app, generation_post(Some(&token), body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let error = body_json(resp).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("Invalid enum value"));

        assert_eq!(upload_count(dir.path()), 0);
        let history = body_json(send(&app, history_get(&token, "")).await).await;
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn generation_with_gif_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;
        let token = signup_token(&app, "gif@test.com").await;

        let body = multipart_body(Some("Red jacket"), Some("Minimal"), Some(("image/gif", &b"GIF89a"[..])));
        let resp = send(&app, generation_post(Some(&token), body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await, json!({ "error": "Only JPEG/PNG allowed" }));
    }

    #[tokio::test]
    async fn forced_overload_returns_503_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Always).await;
        let token = signup_token(&app, "busy@test.com").await;

        let body = multipart_body(Some("Outerwear concept"), Some("Minimal"), Some(("image/png", TINY_PNG)));
        let resp = send(&app, generation_post(Some(&token), body)).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(resp).await, json!({ "message": "Model overloaded" }));
        assert_eq!(upload_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn generation_succeeds_and_appears_in_history() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;
        let token = signup_token(&app, "ok@test.com").await;

        let mut created = Vec::new();
        for prompt in ["Red jacket", "Green scarf"] {
            let body = multipart_body(Some(prompt), Some("Streetwear"), Some(("image/png", TINY_PNG)));
            let resp = send(&app, generation_post(Some(&token), body)).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
            let g = body_json(resp).await;
            assert_eq!(g["prompt"], prompt);
            assert_eq!(g["style"], "Streetwear");
            assert_eq!(g["status"], "succeeded");
            assert!(g["imageUrl"].as_str().unwrap().contains("/uploads/"));
            created.push(g);
        }

        let resp = send(&app, history_get(&token, "")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let history = body_json(resp).await;
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], created[1]);
        assert_eq!(history[1], created[0]);

        // the stored file is served back under the asset URL
        let url = created[0]["imageUrl"].as_str().unwrap().to_string();
        let resp = send(&app, Request::get(url).body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], TINY_PNG);
    }

    #[tokio::test]
    async fn history_never_exceeds_five() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;
        let token = signup_token(&app, "many@test.com").await;

        for i in 0..7 {
            let prompt = format!("look {}", i);
            let body = multipart_body(Some(&prompt), Some("Vintage"), Some(("image/jpeg", &b"jpeg"[..])));
            let resp = send(&app, generation_post(Some(&token), body)).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        for query in ["", "?limit=50", "?limit=0", "?limit=abc"] {
            let history = body_json(send(&app, history_get(&token, query)).await).await;
            let history = history.as_array().unwrap();
            assert_eq!(history.len(), 5, "query {:?}", query);
            assert_eq!(history[0]["prompt"], "look 6");
        }

        let history = body_json(send(&app, history_get(&token, "?limit=2")).await).await;
        assert_eq!(history.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unreadable_history_query_uses_default_limit() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;
        let token = signup_token(&app, "dupq@test.com").await;

        for i in 0..6 {
            let prompt = format!("look {}", i);
            let body = multipart_body(Some(&prompt), Some("Minimal"), Some(("image/png", TINY_PNG)));
            send(&app, generation_post(Some(&token), body)).await;
        }

        let resp = send(&app, history_get(&token, "?limit=1&limit=2")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let history = body_json(resp).await;
        assert_eq!(history.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn body_over_transport_limit_gets_size_message() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(dir.path(), OverloadPolicy::Never).await;
        let token = signup_token(&app, "huge@test.com").await;

        let huge = vec![0u8; 13 * 1024 * 1024];
        let body = multipart_body(Some("Red jacket"), Some("Minimal"), Some(("image/png", &huge[..])));
        let resp = send(&app, generation_post(Some(&token), body)).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            json!({ "error": crate::validators::IMAGE_TOO_LARGE })
        );
        assert_eq!(upload_count(dir.path()), 0);
    }
}
