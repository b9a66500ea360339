use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// The read side of the blog plus comment submission.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /
        // All posts, newest first.
        .route("/", get(handlers::index))
        // GET  /post/{id}: the post, its comments and the comment form.
        // POST /post/{id}: submit a comment. Anonymous visitors are sent to
        // the login page; the comment's post always comes from this path.
        .route(
            "/post/{id}",
            get(handlers::show_post).post(handlers::submit_comment),
        )
}
