use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Every path here starts with a prefix from `policy::ADMIN_PREFIXES`, so the
/// authorization stage rejects non-admin roles with 403 before a handler runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/admin/notes?tags=a,b
        // All live notes of all users, private ones included.
        .route("/api/admin/notes", get(handlers::get_all_notes))
        .route(
            "/api/admin/notes/{id}",
            get(handlers::get_any_note).delete(handlers::delete_any_note),
        )
        // --- User Management ---
        .route(
            "/api/users",
            get(handlers::get_users).post(handlers::create_user),
        )
        .route(
            "/api/users/{id}",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
}
