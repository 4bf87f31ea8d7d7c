use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Post management, nested under `/admin`. The whole router sits behind the
/// admin guard layer in `create_router`; a non-admin request is answered
/// 401/403 before any handler (and any store read) runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/posts, POST /admin/posts
        // Every post including drafts; create a new post.
        .route(
            "/posts",
            get(handlers::admin_list_posts).post(handlers::create_post),
        )
        // GET/PUT/DELETE /admin/posts/{id}
        // Fetch for editing, partial edit, delete.
        .route(
            "/posts/{id}",
            get(handlers::admin_get_post)
                .put(handlers::update_post)
                .delete(handlers::delete_post),
        )
        // PUT /admin/posts/{id}/status
        // Publish or unpublish.
        .route("/posts/{id}/status", put(handlers::set_post_status))
        // GET /admin/stats
        // Published/draft counts.
        .route("/stats", get(handlers::get_admin_stats))
}
