#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use bloggy::{
    AppConfig, AppState, create_router,
    repository::{MemoryRepository, Repository, RepositoryState},
    setup::{SetupOptions, run_setup},
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const ADMIN_EMAIL: &str = "marcus@teste.com";
pub const ADMIN_PASSWORD: &str = "12m34a56r";

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemoryRepository>,
    pub config: AppConfig,
}

/// App over an in-memory store, with the `setup` admin already created.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(AppConfig::default()).await
}

pub async fn spawn_app_with(config: AppConfig) -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    run_setup(repo.as_ref(), &config, SetupOptions::default())
        .await
        .expect("setup should succeed on an empty store");

    let state = AppState {
        repo: repo.clone() as RepositoryState,
        config: config.clone(),
    };
    TestApp {
        router: create_router(state),
        repo,
        config,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str, session: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = session {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, body: &str, session: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = session {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    /// Logs in and returns the `name=value` pair to send back as `Cookie`.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .post_form("/auth/login", &format!("email={email}&password={password}"), None)
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "login should redirect");
        session_cookie(&response).expect("login should set the session cookie")
    }

    pub async fn login_admin(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Registers a regular (non-admin) account and returns its session.
    pub async fn register(&self, email: &str) -> String {
        let body = format!(
            "email={email}&first_name=Ann&last_name=Reader&password=password1&password2=password1"
        );
        let response = self.post_form("/auth/register", &body, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "register should redirect");
        session_cookie(&response).expect("registration should log the user in")
    }

    pub async fn user_id(&self, email: &str) -> i64 {
        self.repo
            .find_user_by_email(email)
            .await
            .unwrap()
            .expect("user exists")
            .id
    }
}

pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("bloggy_session="))
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

pub async fn body_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).expect("response body should be JSON")
}
