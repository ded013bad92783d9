//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gateway handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Match requests to configured routes (longest prefix wins)
//! - Forward GET requests to the route's dependency through its guard
//! - Apply reloaded configuration to the dependency registry
//! - Stop on the shutdown broadcast

use std::io;
use std::sync::Arc;
use std::time::Duration;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{GatewayConfig, RouteConfig};
use crate::http::cache::{ResponseCache, UpstreamPayload};
use crate::http::request::{RequestIdExt, RequestIdLayer, X_REQUEST_ID};
use crate::http::response::outcome_response;
use crate::observability::metrics;
use crate::resilience::{CallHooks, Compensation, DependencyRegistry, Fallback, NetworkError};

pub type HttpClient = Client<HttpConnector, Body>;

/// A configured route with its hooks built once at startup.
pub struct RouteTarget {
    pub name: String,
    pub dependency: String,
    prefix: String,
    upstream: String,
    hooks: CallHooks<UpstreamPayload>,
}

impl RouteTarget {
    pub fn new(route: &RouteConfig, upstream: &str, cache: Arc<ResponseCache>) -> Self {
        Self {
            name: route.name.clone(),
            dependency: route.dependency.clone(),
            prefix: route.path_prefix.trim_end_matches('/').to_string(),
            upstream: upstream.trim_end_matches('/').to_string(),
            hooks: build_hooks(route, cache),
        }
    }

    /// Remainder of `path` after this route's prefix, if it matches.
    pub fn matches<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    pub fn upstream_uri(&self, rest: &str, query: Option<&str>) -> Result<Uri, axum::http::uri::InvalidUri> {
        let path = if rest.is_empty() { "/" } else { rest };
        match query {
            Some(query) => format!("{}{path}?{query}", self.upstream).parse(),
            None => format!("{}{path}", self.upstream).parse(),
        }
    }
}

/// Fallback serves the route's last good payload (or the configured body);
/// compensation keeps that cache honest.
fn build_hooks(route: &RouteConfig, cache: Arc<ResponseCache>) -> CallHooks<UpstreamPayload> {
    let mut hooks = CallHooks::new();

    if let Some(fallback) = &route.fallback {
        let error_field = fallback.error_field.clone();
        let default = UpstreamPayload::json(fallback.body.clone());
        let cache = Arc::clone(&cache);
        let name = route.name.clone();
        hooks = hooks.with_fallback(Fallback::new(
            move |payload: &UpstreamPayload| payload.has_top_level_field(&error_field),
            move |_: &UpstreamPayload| cache.get(&name).unwrap_or_else(|| default.clone()),
        ));
    }

    let store_cache = Arc::clone(&cache);
    let store_name = route.name.clone();
    let max_bytes = route.max_cached_bytes;
    let name = route.name.clone();
    hooks.with_compensation(Compensation::new(
        move |payload: &UpstreamPayload| store_cache.store(&store_name, payload, max_bytes),
        move |_: &UpstreamPayload, _| {
            cache.invalidate(&name);
            Ok(())
        },
    ))
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DependencyRegistry>,
    pub routes: Arc<Vec<RouteTarget>>,
    pub cache: Arc<ResponseCache>,
    pub client: HttpClient,
    pub max_body_bytes: usize,
}

/// HTTP front end of the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    registry: Arc<DependencyRegistry>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let registry = Arc::new(DependencyRegistry::from_config(&config));
        Self::with_registry(config, registry)
    }

    /// Create a server that shares an existing registry (e.g. with the admin API).
    pub fn with_registry(config: GatewayConfig, registry: Arc<DependencyRegistry>) -> Self {
        let cache = Arc::new(ResponseCache::new());

        let mut routes = Vec::with_capacity(config.routes.len());
        for route in &config.routes {
            match config.dependency(&route.dependency) {
                Some(dependency) => {
                    routes.push(RouteTarget::new(route, &dependency.upstream, Arc::clone(&cache)));
                }
                None => tracing::error!(
                    route = %route.name,
                    dependency = %route.dependency,
                    "Route references unknown dependency, skipping"
                ),
            }
        }
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            registry: Arc::clone(&registry),
            routes: Arc::new(routes),
            cache,
            client,
            max_body_bytes: config.timeouts.max_body_bytes,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            registry,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/", any(gateway_handler))
            .route("/{*path}", any(gateway_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn registry(&self) -> Arc<DependencyRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, applying reloaded
    /// configurations from `config_updates` as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.len(),
            dependencies = self.registry.len(),
            "HTTP server starting"
        );

        let registry = Arc::clone(&self.registry);
        let mut active_routes = route_keys(&self.config.routes);
        let reload = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                registry.apply(&config);

                let reloaded_routes = route_keys(&config.routes);
                if reloaded_routes != active_routes {
                    tracing::warn!("Route changes take effect on restart");
                    active_routes = reloaded_routes;
                }
                tracing::info!(dependencies = registry.len(), "Configuration reloaded");
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reload.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn route_keys(routes: &[RouteConfig]) -> Vec<(String, String, String)> {
    routes
        .iter()
        .map(|r| (r.name.clone(), r.path_prefix.clone(), r.dependency.clone()))
        .collect()
}

/// Main gateway handler.
/// Matches a route and forwards the request through the dependency's guard.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request
        .request_id()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();
    let path = request.uri().path();

    let Some((route, rest)) = state
        .routes
        .iter()
        .find_map(|route| route.matches(path).map(|rest| (route, rest)))
    else {
        tracing::debug!(request_id = %request_id, path = %path, "No route matched");
        metrics::record_request("none", 404, start);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };

    if request.method() != Method::GET {
        metrics::record_request(&route.name, 405, start);
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, HeaderValue::from_static("GET"))],
            "Only GET is forwarded",
        )
            .into_response();
    }

    let uri = match route.upstream_uri(rest, request.uri().query()) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, route = %route.name, error = %e, "Invalid upstream URI");
            metrics::record_request(&route.name, 502, start);
            return (StatusCode::BAD_GATEWAY, "Invalid upstream URI").into_response();
        }
    };

    let Some(guard) = state.registry.get(&route.dependency) else {
        tracing::warn!(request_id = %request_id, dependency = %route.dependency, "Dependency no longer configured");
        metrics::record_request(&route.name, 503, start);
        return (StatusCode::SERVICE_UNAVAILABLE, "Dependency not configured").into_response();
    };

    tracing::debug!(
        request_id = %request_id,
        route = %route.name,
        upstream = %uri,
        "Forwarding request"
    );

    let client = state.client.clone();
    let max_body_bytes = state.max_body_bytes;
    let result = guard
        .call_with(
            || fetch(client.clone(), uri.clone(), request_id.clone(), max_body_bytes),
            &route.hooks,
        )
        .await;

    let response = match result {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => {
            tracing::warn!(request_id = %request_id, route = %route.name, error = %e, "Call rejected");
            e.into_response()
        }
    };

    metrics::record_request(&route.name, response.status().as_u16(), start);
    response
}

/// One attempt against the upstream. Any non-2xx status is a failure.
async fn fetch(
    client: HttpClient,
    uri: Uri,
    request_id: String,
    max_body_bytes: usize,
) -> Result<UpstreamPayload, NetworkError> {
    let mut builder = Request::get(uri);
    if !request_id.is_empty() {
        builder = builder.header(X_REQUEST_ID, request_id);
    }
    let request = builder
        .body(Body::empty())
        .map_err(|e| NetworkError::Connect(e.to_string()))?;

    let response = client
        .request(request)
        .await
        .map_err(|e| NetworkError::Connect(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(NetworkError::Status(status.as_u16()));
    }

    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let body = axum::body::to_bytes(Body::new(response.into_body()), max_body_bytes)
        .await
        .map_err(|e| NetworkError::Body(e.to_string()))?;

    Ok(UpstreamPayload { content_type, body })
}
