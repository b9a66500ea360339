use crate::{
    AppState,
    auth::{self, CurrentUser, LOGIN_PATH, RequestContext},
    config::AppConfig,
    error::{AppError, Result},
    models::{
        CommentForm, FormErrors, LoginForm, NewComment, NewPost, NewUser, PostForm, PostId,
        RegistrationForm,
    },
    views::{AuthPage, FormView, IndexPage, NewPostPage, PostPage},
};
use axum::{
    Form, Json,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use uuid::Uuid;

fn post_path(id: PostId) -> String {
    format!("/post/{id}")
}

/// PostPath
///
/// The `{id}` segment of `/post/{id}`. A segment that is not an `i64` names no
/// post, so it is answered with 404 like an unknown id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostPath(pub PostId);

impl<S> FromRequestParts<S> for PostPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::NotFound("post".to_string()))?;
        raw.parse()
            .map(PostPath)
            .map_err(|_| AppError::NotFound(format!("post {raw}")))
    }
}

// --- Blog Handlers ---

/// index
///
/// [Public Route] Every post, newest first.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Post listing", body = IndexPage))
)]
pub async fn index(State(state): State<AppState>) -> Result<Json<IndexPage>> {
    let posts = state.repo.list_posts().await?;
    Ok(Json(IndexPage { posts }))
}

/// show_post
///
/// [Public Route] One post with its comments (newest first) and an empty
/// comment form.
#[utoipa::path(
    get,
    path = "/post/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post page", body = PostPage),
        (status = 404, description = "No such post")
    )
)]
pub async fn show_post(
    State(state): State<AppState>,
    PostPath(id): PostPath,
) -> Result<Json<PostPage>> {
    let post = state
        .repo
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("post {id}")))?;
    let comments = state.repo.list_comments(id).await?;

    Ok(Json(PostPage {
        post,
        comments,
        form: FormView::comment(id, &CommentForm::default()),
    }))
}

/// submit_comment
///
/// [Session Route] Adds a comment to the post named in the path. The target
/// post, the owner and the timestamp are all set here; a `post` field in the
/// form is ignored. Accepted submissions redirect back to the post so a
/// refresh does not resubmit.
///
/// The post is looked up once before the insert and not re-checked; a post
/// removed in between is caught by the store's foreign key, not here.
#[utoipa::path(
    post,
    path = "/post/{id}",
    params(("id" = i64, Path, description = "Post ID")),
    request_body(content = CommentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Comment stored, back to the post"),
        (status = 404, description = "No such post"),
        (status = 422, description = "Rejected form", body = PostPage)
    )
)]
pub async fn submit_comment(
    ctx: RequestContext,
    State(state): State<AppState>,
    PostPath(id): PostPath,
    Form(form): Form<CommentForm>,
) -> Result<Response> {
    let post = state
        .repo
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("post {id}")))?;

    let Some(user_id) = ctx.user_id() else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };

    match NewComment::from_form(form.clone(), id, Some(user_id), Utc::now()) {
        Ok(comment) => {
            let created = state.repo.create_comment(comment).await?;
            tracing::info!(comment_id = created.id, post_id = id, user_id, "comment created");
            Ok(Redirect::to(&post_path(id)).into_response())
        }
        Err(errors) => {
            let comments = state.repo.list_comments(id).await?;
            let page = PostPage {
                post,
                comments,
                form: FormView::comment(id, &form).with_errors(errors),
            };
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(page)).into_response())
        }
    }
}

/// new_post_form
///
/// [Admin Route] The post-creation form. Only reachable through
/// `auth::admin_guard`.
#[utoipa::path(
    get,
    path = "/new",
    responses(
        (status = 200, description = "Post form", body = NewPostPage),
        (status = 303, description = "Not an admin, sent to the listing")
    )
)]
pub async fn new_post_form() -> Json<NewPostPage> {
    Json(NewPostPage {
        form: FormView::post(&PostForm::default()),
    })
}

/// create_post
///
/// [Admin Route] Stores a post owned by the current user and redirects to it.
#[utoipa::path(
    post,
    path = "/new",
    request_body(content = PostForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Post stored, sent to its page"),
        (status = 422, description = "Rejected form", body = NewPostPage)
    )
)]
pub async fn create_post(
    ctx: RequestContext,
    State(state): State<AppState>,
    Form(form): Form<PostForm>,
) -> Result<Response> {
    match NewPost::from_form(form.clone(), ctx.user_id(), Utc::now()) {
        Ok(post) => {
            let created = state.repo.create_post(post).await?;
            tracing::info!(post_id = created.id, user_id = created.user_id, "post created");
            Ok(Redirect::to(&post_path(created.id)).into_response())
        }
        Err(errors) => {
            let page = NewPostPage {
                form: FormView::post(&form).with_errors(errors),
            };
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(page)).into_response())
        }
    }
}

// --- Auth Module Handlers ---

fn auth_page(config: &AppConfig, action: &str, form: FormView) -> AuthPage {
    AuthPage::new(action, config.auth.single_template, form)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// login_page
///
/// [Public Route] The login form.
#[utoipa::path(
    get,
    path = "/auth/login",
    responses((status = 200, description = "Login form", body = AuthPage))
)]
pub async fn login_page(State(config): State<AppConfig>) -> Json<AuthPage> {
    Json(auth_page(&config, "login", FormView::login(&LoginForm::default())))
}

/// login
///
/// [Public Route] Verifies the credentials and starts a session. Unknown
/// email, wrong password and unconfirmed accounts are all answered with the
/// same 401 page and no cookie.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Logged in, session cookie set"),
        (status = 401, description = "Bad credentials", body = AuthPage)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let email = normalize_email(&form.email);
    let user = state.repo.find_user_by_email(&email).await?;

    // Every branch runs one Argon2 verification.
    let hmac_key = &state.config.auth.hmac_key;
    let accepted = match &user {
        Some(user) => {
            auth::verify_password(&form.password, &user.auth.password_hash, hmac_key)?
                && !user.auth.is_pending()
        }
        None => auth::verify_unknown_account(&form.password, hmac_key)?,
    };

    let Some(user) = user.filter(|_| accepted) else {
        tracing::info!(email = %email, "login refused");
        let view = FormView::login(&form)
            .with_errors(FormErrors::single("email", "invalid email or password"));
        let page = auth_page(&state.config, "login", view);
        return Ok((StatusCode::UNAUTHORIZED, Json(page)).into_response());
    };

    let token = auth::issue_session(user.id, &state.config.session_secret, state.config.session_ttl)?;
    tracing::info!(user_id = user.id, "login");
    let jar = jar.add(auth::session_cookie(token, &state.config));
    Ok((jar, Redirect::to("/")).into_response())
}

/// logout
///
/// [Public Route] Drops the session cookie.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 303, description = "Logged out"))
)]
pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    (auth::clear_session(jar), Redirect::to("/"))
}

/// register_page
///
/// [Public Route] The registration form.
#[utoipa::path(
    get,
    path = "/auth/register",
    responses(
        (status = 200, description = "Registration form", body = AuthPage),
        (status = 404, description = "Registration disabled")
    )
)]
pub async fn register_page(State(config): State<AppConfig>) -> Result<Json<AuthPage>> {
    if !config.auth.registration_enabled {
        return Err(AppError::NotFound("registration is disabled".to_string()));
    }
    Ok(Json(auth_page(
        &config,
        "register",
        FormView::register(&RegistrationForm::default()),
    )))
}

/// register
///
/// [Public Route] Creates an account. Without registration verification the
/// new user is logged in straight away. With it, the account gets a
/// registration key that must be confirmed through `/auth/verify/{key}`
/// before the first login; the confirmation link is written to the log.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body(content = RegistrationForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Account created"),
        (status = 404, description = "Registration disabled"),
        (status = 422, description = "Rejected form", body = AuthPage)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(mut form): Form<RegistrationForm>,
) -> Result<Response> {
    let config = &state.config;
    if !config.auth.registration_enabled {
        return Err(AppError::NotFound("registration is disabled".to_string()));
    }

    form.email = normalize_email(&form.email);
    let rejected = |errors: FormErrors| {
        let view = FormView::register(&form).with_errors(errors);
        let page = auth_page(config, "register", view);
        Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(page)).into_response())
    };

    if let Err(errors) = form.check() {
        return rejected(errors);
    }

    let registration_key = config
        .auth
        .registration_verification
        .then(|| Uuid::new_v4().simple().to_string());

    let new_user = NewUser {
        email: form.email.clone(),
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
        password_hash: auth::hash_password(&form.password, &config.auth.hmac_key)?,
        registration_key: registration_key.clone(),
    };

    let user = match state.repo.create_user(new_user).await {
        Ok(user) => user,
        Err(AppError::Conflict(_)) => {
            return rejected(FormErrors::single("email", "is already registered"));
        }
        Err(e) => return Err(e),
    };

    if let Some(key) = registration_key {
        tracing::info!(
            user_id = user.id,
            email = %user.email,
            link = %format!("/auth/verify/{key}"),
            "registration pending verification"
        );
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    }

    tracing::info!(user_id = user.id, "registered");
    let token = auth::issue_session(user.id, &config.session_secret, config.session_ttl)?;
    let jar = jar.add(auth::session_cookie(token, config));
    Ok((jar, Redirect::to("/")).into_response())
}

/// verify_registration
///
/// [Public Route] Confirms a pending account and sends the user to login.
#[utoipa::path(
    get,
    path = "/auth/verify/{key}",
    params(("key" = String, Path, description = "Registration key")),
    responses(
        (status = 303, description = "Account confirmed"),
        (status = 404, description = "Unknown or used key")
    )
)]
pub async fn verify_registration(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Redirect> {
    let user = state
        .repo
        .confirm_registration(&key)
        .await?
        .ok_or_else(|| AppError::NotFound("registration key".to_string()))?;
    tracing::info!(user_id = user.id, "registration confirmed");
    Ok(Redirect::to(LOGIN_PATH))
}

/// me
///
/// [Session Route] The identity behind the current session.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = CurrentUser),
        (status = 401, description = "No session")
    )
)]
pub async fn me(ctx: RequestContext) -> Result<Json<CurrentUser>> {
    ctx.user.map(Json).ok_or(AppError::Unauthorized)
}
