//! Application state and router assembly.

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::fhir::ResourceType;
use crate::loader::{load_conformance_registry, DataLoader, Hydrator};
use crate::middleware::auth::access_token_middleware;
use crate::pod::PodClient;
use crate::provider::ResourceProvider;
use crate::registry::ConformanceRegistry;
use crate::handlers;
use crate::session::SessionStore;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionStore>,
    pub pod: Arc<PodClient>,
    pub registry: Arc<ConformanceRegistry>,
    pub hydrator: Arc<Hydrator>,
    providers: Arc<HashMap<ResourceType, ResourceProvider>>,
}

impl AppState {
    /// Build the full application state: pod client, session store, startup
    /// conformance load, and one provider per user-data type.
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let sessions = Arc::new(SessionStore::new());
        let pod = Arc::new(PodClient::new(config.solid.clone())?);
        let loader = DataLoader::new(config.testdata.path.clone());

        let registry = Arc::new(load_conformance_registry(&loader, &config.ig.url).await);
        let hydrator = Arc::new(Hydrator::new(Arc::clone(&pod), loader));

        let providers = ResourceType::USER_DATA
            .iter()
            .map(|rt| {
                (*rt, ResourceProvider::new(*rt, Arc::clone(&sessions), Arc::clone(&pod)))
            })
            .collect::<HashMap<_, _>>();

        Ok(Self {
            config,
            sessions,
            pod,
            registry,
            hydrator,
            providers: Arc::new(providers),
        })
    }

    /// Build state with an already-populated conformance registry. Used by
    /// tests that want to skip the startup network load.
    pub async fn build_with_registry(
        config: AppConfig,
        registry: ConformanceRegistry,
    ) -> anyhow::Result<Self> {
        let mut state = Self::build(AppConfig {
            ig: crate::config::IgConfig { url: String::new() },
            ..config
        })
        .await?;
        state.registry = Arc::new(registry);
        Ok(state)
    }

    pub fn provider(&self, resource_type: ResourceType) -> Option<&ResourceProvider> {
        self.providers.get(&resource_type)
    }
}

/// Assemble the router and its global middleware stack.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/fhir/metadata", get(handlers::metadata::capability_statement))
        .route(
            "/fhir/:resource_type",
            get(handlers::resource::search_type).post(handlers::resource::create),
        )
        .route(
            "/fhir/:resource_type/:id",
            get(handlers::resource::read)
                .put(handlers::resource::update)
                .delete(handlers::resource::delete),
        )
        .route(
            "/fhir/:resource_type/:id/_history/:version",
            get(handlers::resource::vread),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            access_token_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
