use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes open to any valid token, `guest` included. Every note handler here
/// enforces ownership itself through `policy::ensure_owner`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/token
        // Echoes the claims of the presented token.
        .route("/api/token", get(handlers::validate_token))
        // GET/POST /api/notes
        // The caller's own notes (optionally ?tags=) and note creation.
        .route(
            "/api/notes",
            get(handlers::get_my_notes).post(handlers::create_note),
        )
        // GET/PATCH/DELETE /api/notes/{id}
        // Owner only. Another user's note is 403 even when public.
        .route(
            "/api/notes/{id}",
            get(handlers::get_my_note)
                .patch(handlers::update_note)
                .delete(handlers::delete_note),
        )
}
