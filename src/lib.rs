use axum::{Router, extract::FromRef, http::HeaderName, middleware};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;

// Route tables, one per access class (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::TokenService;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{NoteRepositoryState, UserRepositoryState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::hello, handlers::login, handlers::signup, handlers::validate_token,
        handlers::get_public_notes, handlers::get_my_notes, handlers::get_my_note,
        handlers::create_note, handlers::update_note, handlers::delete_note,
        handlers::get_all_notes, handlers::get_any_note, handlers::delete_any_note,
        handlers::get_users, handlers::get_user, handlers::create_user,
        handlers::update_user, handlers::delete_user
    ),
    components(
        schemas(
            models::Role, models::Link, models::Profile, models::User, models::Tag, models::Note,
            models::LoginRequest, models::SignupRequest, models::CreateUserRequest,
            models::UpdateUserRequest, models::CreateNoteRequest, models::UpdateNoteRequest,
            models::AuthResponse, auth::Claims,
        )
    ),
    tags(
        (name = "grimoire", description = "Grimoire Notes API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container of shared services. Cloned per request; every
/// field is either an `Arc` or cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Note and tag persistence.
    pub notes: NoteRepositoryState,
    /// User account persistence.
    pub users: UserRepositoryState,
    /// Session token issuance and validation.
    pub tokens: TokenService,
    /// The loaded environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// The `AuthUser` extractor pulls the token service out of any state.

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

/// create_router
///
/// Assembles the routing table and the request pipeline.
///
/// Protected routes pass two stages in a fixed order: `authenticate` (token to
/// identity, 401 on failure) and then `authorize` (route class and role, 403 on
/// failure). A handler on a protected route never runs without both.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");
    let request_timeout = state.config.request_timeout;

    // route_layer: the last one added runs first.
    let protected = authenticated::authenticated_routes()
        .merge(admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::authorize))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::authenticate));

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
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
                .layer(PropagateRequestIdLayer::new(x_request_id))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, correlated by the `x-request-id` header.
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
