use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that bypass the authentication stage. Each path here is listed in
/// `policy::PUBLIC_PATHS`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        .route("/hello", get(handlers::hello))
        // POST /api/auth/login
        // Email + password for a session token.
        .route("/api/auth/login", post(handlers::login))
        // POST /api/auth/signup
        // Creates a `user`-role account and returns a token for it.
        .route("/api/auth/signup", post(handlers::signup))
        // GET /api/notes/public?tags=a,b
        // Only `is_public=true` notes leave this endpoint.
        .route("/api/notes/public", get(handlers::get_public_notes))
}
