use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Endpoints for any signed-in principal regardless of role. The router is
/// layered with the session middleware in `create_router`, and each handler
/// also takes the `Principal` extractor.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // The resolved principal (identity, email, display name, role).
        .route("/me", get(handlers::get_me))
        // POST /auth/sign-out
        // Ends the provider session behind the bearer token.
        .route("/auth/sign-out", post(handlers::sign_out))
}
