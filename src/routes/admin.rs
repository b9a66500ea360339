use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Post publishing. `create_router` wraps this router in
/// `auth::admin_guard`, so the handlers never run for non-members: they are
/// redirected to `/` instead.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET  /new: the post form.
        // POST /new: store the post, redirect to `/post/{id}`.
        .route(
            "/new",
            get(handlers::new_post_form).post(handlers::create_post),
        )
}
