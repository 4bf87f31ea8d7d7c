use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Every content read here goes
/// through the public visibility rules, so drafts are never listed and a
/// draft requested by id answers 404 like a missing post.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /posts
        // The reader-facing feed: published posts, newest first.
        .route("/posts", get(handlers::list_posts))
        // GET /posts/{id}
        // A single published post.
        .route("/posts/{id}", get(handlers::get_post))
        // POST /auth/sign-in
        // Exchanges credentials with the identity provider for a token + principal.
        .route("/auth/sign-in", post(handlers::sign_in))
        // GET /session
        // The caller's resolved session, or `principal: null`.
        .route("/session", get(handlers::get_session))
}
