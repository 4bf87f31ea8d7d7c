use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access-control core.
pub mod guard;
pub mod session;
pub mod visibility;

// External capabilities and their implementations.
pub mod directory;
pub mod identity;
pub mod repository;

// HTTP surface and ambient concerns.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod mutation;

// Routing segregated by guard (Public, Authenticated, Admin).
pub mod routes;
use auth::AdminPrincipal;
use models::Principal;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use directory::{DirectoryState, MemoryDirectory, PostgresDirectory};
pub use identity::{IdentityState, SupabaseIdentityProvider};
pub use mutation::MutationRunner;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every handler and payload, served at
/// `/api-docs/openapi.json` and browsable under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_posts, handlers::get_post, handlers::sign_in, handlers::get_session,
        handlers::get_me, handlers::sign_out, handlers::admin_list_posts,
        handlers::admin_get_post, handlers::create_post, handlers::update_post,
        handlers::set_post_status, handlers::delete_post, handlers::get_admin_stats
    ),
    components(
        schemas(
            models::Post, models::Principal, models::Role, models::CreatePostRequest,
            models::UpdatePostRequest, models::PublishRequest, models::SignInRequest,
            models::SignInResponse, models::SessionResponse, models::AdminDashboardStats,
        )
    ),
    tags(
        (name = "blog-portal", description = "Blog reader feed and admin API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for every service the handlers need.
#[derive(Clone)]
pub struct AppState {
    /// Content store.
    pub repo: RepositoryState,
    /// User directory (identity → role/profile).
    pub directory: DirectoryState,
    /// Identity provider.
    pub identity: IdentityState,
    /// In-flight registry for fire-and-confirm writes.
    pub mutations: MutationRunner,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for DirectoryState {
    fn from_ref(app_state: &AppState) -> DirectoryState {
        app_state.directory.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// session_middleware
///
/// Rejects requests without a signed-in principal before they reach the
/// authenticated router. The resolved principal travels on in the request
/// extensions so handler extractors do not resolve it again.
async fn session_middleware(principal: Principal, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(principal);
    next.run(request).await
}

/// admin_middleware
///
/// Runs the admin guard for the whole `/admin` router. Denied requests are
/// answered 401/403 here and never reach a handler. Admitted requests carry
/// the principal in their extensions.
async fn admin_middleware(
    AdminPrincipal(admin): AdminPrincipal,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(admin);
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies the guard layers and the
/// observability stack, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                session_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for every request, tagged with the `x-request-id` so all log lines of
/// one request correlate.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
