//! HTTP Server implementation
//!
//! This module provides the HTTP server using Axum framework with:
//! - Configurable host/port binding
//! - Graceful shutdown handling
//! - Request timeouts, security headers and trace IDs
//! - Health check endpoint
//! - CORS support

use crate::api::handlers::AppState;
use crate::api::middleware::{security_headers, trace_id_middleware, SecurityHeaders};
use crate::api::routes::{build_api_routes, build_public_routes};
use crate::core::config::ServerConfig;
use crate::core::Config;
use crate::db::manager::DatabaseManager;
use axum::{middleware, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

/// HTTP API Server
pub struct ApiServer {
    router: Router,
    config: ServerConfig,
}

impl ApiServer {
    pub fn new(config: Arc<Config>, db: Arc<DatabaseManager>) -> Self {
        let server_config = config.server.clone();
        Self {
            router: Self::build_router(config, db),
            config: server_config,
        }
    }

    /// Full application router with every middleware layer applied
    pub fn build_router(config: Arc<Config>, db: Arc<DatabaseManager>) -> Router {
        let app_state = AppState::new(config.clone(), db);
        let headers = SecurityHeaders::new(config.security.enable_hsts, config.security.hsts_max_age);

        Router::new()
            .route("/health", get(health_check))
            .merge(build_public_routes(app_state.clone()))
            .merge(build_api_routes(app_state))
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn_with_state(headers, security_headers))
                    .layer(middleware::from_fn(trace_id_middleware))
                    .layer(TraceLayer::new_for_http())
                    .layer(Self::build_cors_layer(&config.security.allowed_origins))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout))),
            )
    }

    /// Build CORS layer from allowed origins configuration; `*` allows any origin
    fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
        let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

        if allowed_origins.iter().any(|o| o == "*") {
            cors.allow_origin(Any)
        } else {
            let origins: Vec<_> = allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
    }

    /// Listen until Ctrl+C or SIGTERM, then drain in-flight requests
    pub async fn serve(self) -> anyhow::Result<()> {
        let socket_addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            request_timeout = self.config.request_timeout,
            "Starting HTTP server"
        );

        let listener = tokio::net::TcpListener::bind(socket_addr).await?;
        info!(addr = %socket_addr, "HTTP server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }
}

/// Health check endpoint handler
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Initiating graceful shutdown...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::seed;
    use crate::core::utils::now_timestamp;
    use crate::db::models::PointKind;
    use crate::db::repository::points;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        db: Arc<DatabaseManager>,
    }

    impl TestApp {
        fn new() -> Self {
            let config = Arc::new(Config::defaults().unwrap());
            let db = Arc::new(DatabaseManager::new_in_memory().unwrap());
            Self {
                router: ApiServer::build_router(config, db.clone()),
                db,
            }
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header("Authorization", format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => request
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            }
            .unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }

        /// Register a user and return (user id, token)
        async fn register(&self, username: &str) -> (String, String) {
            let (status, body) = self
                .send(
                    Method::POST,
                    "/api/v1/auth/register",
                    None,
                    Some(json!({
                        "username": username,
                        "email": format!("{}@leaf.test", username),
                        "password": "secret123",
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            (
                body["data"]["user"]["id"].as_str().unwrap().to_string(),
                body["data"]["token"].as_str().unwrap().to_string(),
            )
        }

        async fn post_book(&self, token: &str, isbn: &str) -> String {
            let (status, body) = self
                .send(
                    Method::POST,
                    "/api/v1/books",
                    Some(token),
                    Some(json!({
                        "title": "Dune",
                        "author": "Frank Herbert",
                        "category": "Science Fiction",
                        "isbn": isbn,
                        "pages": 412,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            body["data"]["book"]["id"].as_str().unwrap().to_string()
        }

        async fn grant(&self, user_id: &str, amount: i64) {
            let user_id = user_id.to_string();
            self.db
                .execute(move |conn| {
                    points::insert_transaction(
                        conn,
                        &user_id,
                        amount,
                        PointKind::Achievement,
                        "grant",
                        None,
                        &now_timestamp(),
                    )
                    .map(|_| ())
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = TestApp::new();
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-trace-id"));
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");

        let (_, body) = app.send(Method::GET, "/health", None, None).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let app = TestApp::new();
        app.register("alice").await;

        let (status, body) = app
            .send(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({"username": "alice", "email": "other@leaf.test", "password": "secret123"})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Conflict");
        assert!(body["trace_id"].is_string());

        let (status, body) = app
            .send(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"login": "alice@leaf.test", "password": "secret123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["role"], "admin");
        let token = body["token"].as_str().unwrap().to_string();

        let (status, _) = app
            .send(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"login": "alice", "password": "wrong-password"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app.send(Method::GET, "/api/v1/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");

        let (status, _) = app.send(Method::GET, "/api/v1/books", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_protected_routes_resolve_token() {
        let app = TestApp::new();
        let (_, token) = app.register("alice").await;

        let uri = format!("/api/v1/me?token={}", token);
        let (status, body) = app.send(Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
        assert!(body["last_activity"].is_string());

        let (status, body) = app
            .send(Method::GET, "/api/v1/me", Some("not-a-token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "AuthenticationError");

        let (status, _) = app
            .send(Method::GET, "/api/v1/notifications/count", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_borrow_workflow_over_http() {
        let app = TestApp::new();
        let (_, alice) = app.register("alice").await;
        let (bob_id, bob) = app.register("bob").await;
        let book_id = app.post_book(&alice, "978-0441013593").await;

        let (status, _) = app
            .send(Method::POST, &format!("/api/v1/books/{}/borrow", book_id), Some(&alice), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .send(
                Method::POST,
                &format!("/api/v1/books/{}/borrow", book_id),
                Some(&bob),
                Some(json!({})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["data"]["is_agreed"], false);

        let (_, body) = app
            .send(Method::GET, &format!("/api/v1/books/{}", book_id), Some(&bob), None)
            .await;
        assert_eq!(body["borrow_status"], "pending");

        let (_, body) = app
            .send(Method::GET, "/api/v1/notifications/count", Some(&alice), None)
            .await;
        assert_eq!(body["count"], 1);

        let (status, body) = app
            .send(
                Method::POST,
                &format!("/api/v1/books/{}/borrow/approve", book_id),
                Some(&alice),
                Some(json!({ "borrower_id": bob_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["record"]["is_agreed"], true);

        let (_, body) = app
            .send(Method::GET, "/api/v1/notifications", Some(&bob), None)
            .await;
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["items"][0]["type"], "borrow_approved");

        let (_, body) = app
            .send(Method::GET, &format!("/api/v1/books/{}", book_id), Some(&bob), None)
            .await;
        assert_eq!(body["borrow_status"], "borrowed");
        assert_eq!(body["available"], false);

        let (status, _) = app
            .send(Method::DELETE, &format!("/api/v1/books/{}", book_id), Some(&alice), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = app.send(Method::GET, "/api/v1/borrowed-books", Some(&bob), None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["is_overdue"], false);

        let (status, _) = app
            .send(Method::POST, &format!("/api/v1/books/{}/return", book_id), Some(&bob), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .send(Method::DELETE, &format!("/api/v1/books/{}", book_id), Some(&alice), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_reviews_upsert_and_validate() {
        let app = TestApp::new();
        let (_, alice) = app.register("alice").await;
        let (_, bob) = app.register("bob").await;
        let book_id = app.post_book(&alice, "978-0441013593").await;
        let uri = format!("/api/v1/books/{}/reviews", book_id);

        let (status, _) = app
            .send(Method::POST, &uri, Some(&bob), Some(json!({"rating": 6})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(Method::POST, &uri, Some(&bob), Some(json!({"rating": 4, "comment": "Good"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app
            .send(Method::POST, &uri, Some(&bob), Some(json!({"rating": 5})))
            .await;
        assert_eq!(status, StatusCode::OK);
        let review_id = body["data"]["review"]["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .send(Method::POST, &uri, Some(&alice), Some(json!({"rating": 2})))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = app.send(Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["average_rating"], 3.5);

        let (status, _) = app
            .send(Method::DELETE, &format!("/api/v1/reviews/{}", review_id), Some(&alice), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_store_requires_points() {
        let app = TestApp::new();
        seed::seed_power_ups(&app.db).await.unwrap();
        let (bob_id, bob) = app.register("bob").await;

        let (status, body) = app.send(Method::GET, "/api/v1/store", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_access"], false);
        let double_points = body["power_ups"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["kind"] == "double_points")
            .unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();

        let purchase = json!({ "power_up_id": double_points });
        let (status, _) = app
            .send(Method::POST, "/api/v1/store/purchase", Some(&bob), Some(purchase.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        app.grant(&bob_id, 250).await;
        let (status, body) = app
            .send(Method::POST, "/api/v1/store/purchase", Some(&bob), Some(purchase))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["data"]["remaining_points"], 50);

        let owned_id = body["data"]["owned"]["id"].as_str().unwrap().to_string();
        let (status, body) = app
            .send(
                Method::POST,
                "/api/v1/store/activate",
                Some(&bob),
                Some(json!({ "user_power_up_id": owned_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin() {
        let app = TestApp::new();
        let (_, alice) = app.register("alice").await;
        let (_, bob) = app.register("bob").await;

        let (status, _) = app
            .send(Method::POST, "/api/v1/admin/seed/books", Some(&bob), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .send(Method::POST, "/api/v1/admin/seed/books", Some(&alice), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["inserted"], 5);

        let (_, body) = app
            .send(Method::GET, "/api/v1/books?per_page=2", Some(&bob), None)
            .await;
        assert_eq!(body["pagination"]["total"], 5);
        assert_eq!(body["pagination"]["pages"], 3);
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
    }
}
