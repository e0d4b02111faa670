use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::generator::Resolver;

pub const AWAKE_TEXT: &str = "Hi, I'm awake!";
pub const MISSING_TOKEN_TEXT: &str = "You need to add a DISCORD_TOKEN to the .env file.";
pub const ONLINE_TEXT: &str = "online";

/// What the HTTP surface needs to know about the running bot.
pub struct ServerState {
    pub discord_configured: bool,
    /// Present when the `/api` endpoint is enabled
    pub resolver: Option<Arc<Resolver>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiQuery {
    pub generator: String,
    pub list: Option<String>,
}

/// Run the liveness server until it fails.
pub async fn run(state: Arc<ServerState>, bind_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: Arc<ServerState>) -> Router {
    let mut router = Router::new()
        .route("/", get(root_handler))
        .route("/status", get(status_handler));
    if state.resolver.is_some() {
        router = router.route("/api", get(api_handler));
    }
    router
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn root_handler(State(state): State<Arc<ServerState>>) -> &'static str {
    if state.discord_configured {
        AWAKE_TEXT
    } else {
        MISSING_TOKEN_TEXT
    }
}

async fn status_handler() -> &'static str {
    debug!("Status probe");
    ONLINE_TEXT
}

async fn api_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ApiQuery>,
) -> String {
    let Some(resolver) = &state.resolver else {
        return String::new();
    };
    let list = query.list.as_deref().filter(|list| !list.is_empty());
    resolver.resolve_text(&query.generator, list, &[]).await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::generator::testing::{FakeCatalog, FakeHost};
    use crate::generator::{CacheOptions, GeneratorCache, GeneratorLoader, LoadPolicy};

    async fn get_text(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn state(discord_configured: bool, resolver: Option<Arc<Resolver>>) -> Arc<ServerState> {
        Arc::new(ServerState {
            discord_configured,
            resolver,
        })
    }

    #[tokio::test]
    async fn root_reports_awake() {
        let (status, body) = get_text(create_router(state(true, None)), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, AWAKE_TEXT);
    }

    #[tokio::test]
    async fn root_reports_missing_token() {
        let (_, body) = get_text(create_router(state(false, None)), "/").await;
        assert_eq!(body, MISSING_TOKEN_TEXT);
    }

    #[tokio::test]
    async fn status_is_online() {
        let (_, body) = get_text(create_router(state(false, None)), "/status").await;
        assert_eq!(body, "online");
    }

    #[tokio::test]
    async fn api_disabled_by_default() {
        let (status, _) = get_text(create_router(state(true, None)), "/api?generator=x").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn api_resolves_generators() {
        let host = Arc::new(
            FakeHost::default().with_tree("animal", json!({ "output": "cat", "plural": "cats" })),
        );
        let loader = GeneratorLoader::new(Arc::new(FakeCatalog::default()), host, LoadPolicy::default());
        let resolver = Arc::new(Resolver::new(Arc::new(GeneratorCache::new(
            loader,
            CacheOptions::default(),
        ))));
        let router = create_router(state(true, Some(resolver)));

        let (_, body) = get_text(router.clone(), "/api?generator=animal").await;
        assert_eq!(body, "cat");
        let (_, body) = get_text(router, "/api?generator=animal&list=plural").await;
        assert_eq!(body, "cats");
    }
}
