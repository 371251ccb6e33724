//! Warden - multi-tenant role-based access control with bearer-token
//! authentication.

pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod schema;
pub mod store;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header::HeaderName, Method, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use diesel::PgConnection;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use auth::{CredentialService, PasswordPolicy, TokenService};
use authz::{PermissionResolver, TenantGuard};
use config::{CorsConfig, StoreBackend};
use error::ApiError;
use handlers::{auth as auth_handlers, health, organizations, permissions, projects, roles, teams, users};
use middleware::{auth_middleware, metrics_middleware, request_id_middleware};
use store::{DbPool, MemoryStore, PgStore, Store};
use telemetry::MetricsState;

/// Everything a request handler needs. Components share one store and are
/// cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub credentials: CredentialService,
    pub resolver: PermissionResolver,
    pub guard: TenantGuard,
    pub metrics: MetricsState,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        let security = &config.security;

        let tokens = TokenService::from_settings(&config.jwt);
        let credentials = CredentialService::new(
            store.clone(),
            tokens,
            PasswordPolicy::new(security.min_password_length),
            security.password_hash_cost,
            security.default_organization_id,
        );
        let resolver = PermissionResolver::new(store.clone(), security.legacy_admin_role_id);
        let guard = TenantGuard::new(
            store.clone(),
            resolver.clone(),
            security.default_organization_id,
        );

        Self {
            store,
            credentials,
            resolver,
            guard,
            metrics: MetricsState::new(config.telemetry.metrics_enabled),
        }
    }
}

pub fn create_router(state: AppState, config: &Config) -> Router {
    let cors = build_cors_layer(&config.cors);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::live_check))
        .route("/health/ready", get(health::ready_check))
        .route("/auth/register", post(auth_handlers::register))
        .route("/auth/login", post(auth_handlers::login))
        .with_state(state.clone())
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(state.metrics.clone()),
        );

    let protected_routes = Router::new()
        .route("/users/me", get(users::get_me).put(users::update_me))
        .route("/users/me/permissions", get(users::my_permissions))
        .route("/users/me/projects", get(users::my_projects))
        .route("/users/me/projects/{project_id}", get(users::my_project))
        .route(
            "/users/me/organization/projects",
            get(users::my_organization_projects),
        )
        .route(
            "/users/me/organization/projects/stats",
            get(users::my_organization_stats),
        )
        .route(
            "/admin/users",
            get(users::list_users).post(users::create_user),
        )
        .route(
            "/admin/users/{user_id}",
            put(users::update_user).delete(users::delete_user),
        )
        .route(
            "/organizations",
            get(organizations::list_organizations).post(organizations::create_organization),
        )
        .route(
            "/organizations/{organization_id}",
            get(organizations::get_organization)
                .put(organizations::update_organization)
                .delete(organizations::delete_organization),
        )
        .route(
            "/organizations/{organization_id}/users",
            get(organizations::organization_users),
        )
        .route(
            "/organizations/{organization_id}/projects",
            get(organizations::organization_projects),
        )
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/projects/stats", get(projects::project_stats))
        .route(
            "/projects/{project_id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/projects/{project_id}/team",
            get(teams::list_team).post(teams::add_team_member),
        )
        .route(
            "/projects/{project_id}/team/{user_id}",
            delete(teams::remove_team_member),
        )
        .route("/roles", get(roles::list_roles).post(roles::create_role))
        .route(
            "/roles/{role_id}",
            put(roles::update_role).delete(roles::delete_role),
        )
        .route("/permissions", get(permissions::list_permissions))
        .route("/permissions/check", post(permissions::check_permission))
        .route(
            "/permissions/check-bulk",
            post(permissions::check_permissions_bulk),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(openapi::swagger_router())
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new("Not found", "NOT_FOUND")),
    )
}

fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    let headers: Vec<HeaderName> = cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let wildcard = cors.allowed_origins.is_empty() || cors.allowed_origins.iter().any(|o| o == "*");
    // Credentials cannot be combined with a literal `*` origin.
    let origin = match (wildcard, cors.allow_credentials) {
        (true, true) => AllowOrigin::mirror_request(),
        (true, false) => AllowOrigin::any(),
        (false, _) => AllowOrigin::list(
            cors.allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok()),
        ),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(cors.allow_credentials)
        .max_age(Duration::from_secs(cors.max_age_secs))
}

pub fn create_db_pool(config: &Config) -> Result<DbPool, PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    Pool::builder()
        .max_size(config.database.max_connections)
        .min_idle(Some(config.database.min_connections))
        .connection_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.database.idle_timeout_secs)))
        .build(manager)
}

/// Builds the configured persistence backend.
pub fn build_store(config: &Config) -> Result<Arc<dyn Store>, PoolError> {
    match config.database.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store; data is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            info!(
                database = %config.database.url.split('@').next_back().unwrap_or("***"),
                max_connections = config.database.max_connections,
                "Connecting to database"
            );
            Ok(Arc::new(PgStore::new(create_db_pool(config)?)))
        }
    }
}

pub fn init_tracing(config: &Config) {
    telemetry::init_telemetry(config);
}

pub use config::Config;
pub use telemetry::shutdown_telemetry;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_build_cors_layer_variants() {
        let mut cors = Config::default_for_testing().cors;
        cors.allowed_origins = vec!["*".to_string()];
        let _ = build_cors_layer(&cors);

        cors.allow_credentials = true;
        let _ = build_cors_layer(&cors);

        cors.allowed_origins = vec![
            "http://localhost:3000".to_string(),
            "https://example.com".to_string(),
        ];
        let _ = build_cors_layer(&cors);
    }

    #[test]
    fn test_memory_store_from_testing_config() {
        let config = Config::default_for_testing();
        let store = build_store(&config).unwrap();
        assert!(store.ping().is_ok());
    }

    #[test]
    fn test_router_builds() {
        let config = Config::default_for_testing();
        let state = AppState::new(Arc::new(MemoryStore::new()), &config);
        let _ = create_router(state, &config);
    }
}
