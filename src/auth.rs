use std::{
    collections::BTreeSet,
    convert::Infallible,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::{ADMIN_GROUP, User, UserId},
    repository::RepositoryState,
};

/// Name of the cookie carrying the signed session token.
pub const SESSION_COOKIE: &str = "bloggy_session";

/// Where anonymous visitors are sent when an action needs a session.
pub const LOGIN_PATH: &str = "/auth/login";

// --- Password Credentials ---

fn hasher(hmac_key: &str) -> Result<Argon2<'_>, AppError> {
    Argon2::new_with_secret(
        hmac_key.as_bytes(),
        Algorithm::Argon2id,
        Version::V0x13,
        Params::default(),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("argon2 setup failed: {e}")))
}

/// hash_password
///
/// Argon2id with a random per-password salt. The configured HMAC key is used
/// as the Argon2 secret, so a leaked hash cannot be checked without it.
/// Returns a PHC string for storage.
pub fn hash_password(password: &str, hmac_key: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher(hmac_key)?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

/// verify_password
///
/// `Ok(false)` for a wrong password; `Err` only if the stored hash is corrupt.
pub fn verify_password(password: &str, stored: &str, hmac_key: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid password hash: {e}")))?;

    match hasher(hmac_key)?.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(anyhow::anyhow!(
            "password verification failed: {e}"
        ))),
    }
}

/// A hash no password matches, with the same Argon2 parameters as
/// `hash_password`.
const UNKNOWN_ACCOUNT_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$ONnrs3P6ZuixLn514QcNJg$6JXN0tI/FmIxcStKCw6yMWo5aC0xUhrcgq0Vwqa6JqA";

/// verify_unknown_account
///
/// Login attempt for an email with no account. Pays for a full Argon2
/// verification so the response time does not reveal which emails exist.
/// Always `Ok(false)`.
pub fn verify_unknown_account(password: &str, hmac_key: &str) -> Result<bool, AppError> {
    verify_password(password, UNKNOWN_ACCOUNT_HASH, hmac_key).map(|_| false)
}

// --- Session Tokens ---

/// Claims
///
/// Payload of the session token stored in `SESSION_COOKIE`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The user id, as a decimal string.
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

fn unix_now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or_default()
}

/// Signs a session token for `user_id` valid for `ttl`.
pub fn issue_session(user_id: UserId, secret: &str, ttl: Duration) -> Result<String, AppError> {
    let iat = unix_now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat,
        exp: iat + ttl.as_secs() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("session signing failed: {e}")))
}

/// Returns the user id of a valid, unexpired token signed with `secret`.
pub fn read_session(token: &str, secret: &str) -> Option<UserId> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation) {
        Ok(data) => data.claims.sub.parse().ok(),
        Err(e) => {
            tracing::debug!("rejected session token: {}", e);
            None
        }
    }
}

/// The cookie that establishes a session after login or registration. It is
/// a browser-session cookie; expiry is enforced by the token itself.
pub fn session_cookie(token: String, config: &AppConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.env == Env::Production)
        .build()
}

/// Drops the session cookie from the jar.
pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

// --- Request Context ---

/// CurrentUser
///
/// The authenticated identity resolved for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub groups: BTreeSet<String>,
}

impl CurrentUser {
    pub fn has_membership(&self, role: &str) -> bool {
        self.groups.contains(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_membership(ADMIN_GROUP)
    }
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            groups: user.auth.groups,
        }
    }
}

/// RequestContext
///
/// Passed explicitly into every handler that cares about who is asking.
/// `user` is `None` for anonymous requests.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<CurrentUser>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }
}

/// RequestContext Extractor
///
/// Resolves the session cookie to a user. A missing, forged, expired or
/// dangling session never fails the request: it yields an anonymous context.
/// The result is cached in the request extensions so that a guard layer and
/// the handler behind it resolve the session only once.
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<RequestContext>() {
            return Ok(ctx.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let jar = CookieJar::from_headers(&parts.headers);
        let user_id = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| read_session(cookie.value(), &config.session_secret));

        let user = match user_id {
            Some(id) => match repo.get_user(id).await {
                Ok(Some(user)) if !user.auth.is_pending() => Some(CurrentUser::from(user)),
                Ok(_) => None,
                Err(e) => {
                    tracing::error!("session lookup failed for user {}: {:?}", id, e);
                    None
                }
            },
            None => None,
        };

        let ctx = RequestContext { user };
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

// --- Route Guarding ---

/// requires
///
/// Evaluates `predicate` against the current user. Anonymous requests and
/// users failing the predicate get a redirect to `fallback` instead.
pub fn requires<'a, P>(
    ctx: &'a RequestContext,
    predicate: P,
    fallback: &str,
) -> Result<&'a CurrentUser, Redirect>
where
    P: FnOnce(&CurrentUser) -> bool,
{
    match ctx.user.as_ref() {
        Some(user) if predicate(user) => Ok(user),
        _ => Err(Redirect::to(fallback)),
    }
}

/// admin_guard
///
/// Layer for the admin router: the handler runs only for members of the
/// `admin` group, everyone else is redirected to the post listing.
pub async fn admin_guard(ctx: RequestContext, request: Request, next: Next) -> Response {
    match requires(&ctx, CurrentUser::is_admin, "/") {
        Ok(_) => next.run(request).await,
        Err(redirect) => {
            tracing::info!(
                user_id = ?ctx.user_id(),
                path = %request.uri().path(),
                "admin route refused"
            );
            redirect.into_response()
        }
    }
}
