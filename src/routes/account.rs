use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Account Router Module
///
/// Login, logout, registration and the current-identity endpoint. Nested
/// under `/auth` by `create_router`.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(handlers::login_page).post(handlers::login))
        // GET is accepted as well so a plain link can end the session.
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register),
        )
        // GET /verify/{key}
        // Confirms an account created while registration verification is on.
        .route("/verify/{key}", get(handlers::verify_registration))
        // GET /me
        // 401 without a session.
        .route("/me", get(handlers::me))
}

