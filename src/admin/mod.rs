//! Admin API.
//!
//! Read-only JSON views of the dependency registry, served on a separate
//! bind address behind a bearer API key.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;
use axum::{middleware, routing::get, Router};

use crate::resilience::DependencyRegistry;
use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<DependencyRegistry>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

impl AdminState {
    pub fn new(registry: Arc<DependencyRegistry>, api_key: &str) -> Self {
        Self {
            registry,
            api_key: Arc::from(api_key),
            started_at: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/dependencies", get(get_dependencies))
        .route("/admin/dependencies/{name}", get(get_dependency))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::config::{DependencyConfig, GatewayConfig};

    fn router() -> Router {
        let mut config = GatewayConfig::default();
        config.dependencies.push(DependencyConfig::new("users", "http://127.0.0.1:3000"));
        config.dependencies.push(DependencyConfig::new("orders", "http://127.0.0.1:3001"));
        let registry = Arc::new(DependencyRegistry::from_config(&config));
        registry.get("users").unwrap().breaker().trip();

        setup_admin_router(AdminState::new(registry, "secret"))
    }

    fn get(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(key) = key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_missing_or_wrong_key() {
        let response = router().oneshot(get("/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router().oneshot(get("/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_status_counts_open_circuits() {
        let response = router().oneshot(get("/admin/status", Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["dependencies"], 2);
        assert_eq!(body["open_circuits"], 1);
    }

    #[tokio::test]
    async fn test_dependency_snapshots() {
        let response = router()
            .oneshot(get("/admin/dependencies", Some("secret")))
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body[0]["name"], "orders");
        assert_eq!(body[1]["name"], "users");
        assert_eq!(body[1]["circuit_breaker"]["state"], "open");

        let response = router()
            .oneshot(get("/admin/dependencies/users", Some("secret")))
            .await
            .unwrap();
        assert_eq!(json(response).await["rate_limiter"]["limit"], 5);

        let response = router()
            .oneshot(get("/admin/dependencies/missing", Some("secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
