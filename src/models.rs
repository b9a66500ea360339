use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::Validate;

pub type UserId = i64;
pub type PostId = i64;
pub type CommentId = i64;

/// Name of the group whose members may publish posts.
pub const ADMIN_GROUP: &str = "admin";

// --- Core Entities (Mapped to Database) ---

/// User
///
/// Identity record from the `users` table. Credentials and group memberships
/// live in the embedded `AuthRecord` rather than in a base type.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    #[ts(skip)]
    pub auth: AuthRecord,
}

/// AuthRecord
///
/// The authentication capability of a user: the stored password hash, a
/// pending registration key (if the account is not yet confirmed) and the
/// names of the groups the user belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRecord {
    pub password_hash: String,
    pub registration_key: Option<String>,
    pub groups: BTreeSet<String>,
}

impl AuthRecord {
    pub fn has_membership(&self, role: &str) -> bool {
        self.groups.contains(role)
    }

    /// An account with an outstanding registration key cannot log in.
    pub fn is_pending(&self) -> bool {
        self.registration_key.is_some()
    }
}

impl User {
    pub fn has_membership(&self, role: &str) -> bool {
        self.auth.has_membership(role)
    }
}

/// Group
///
/// A named role (`auth_groups` table) that users are attached to through
/// memberships.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub role: String,
}

/// Post
///
/// A row of the `posts` table. `date` and `user_id` are assigned by the server
/// when the post is built and are never read from a form.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub text: String,
    #[ts(type = "string")]
    pub date: DateTime<Utc>,
    pub user_id: UserId,
}

/// Comment
///
/// A row of the `comments` table. `post_id` always comes from the route the
/// comment was submitted on.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    #[ts(type = "string")]
    pub date: DateTime<Utc>,
    pub user_id: UserId,
    pub post_id: PostId,
}

// --- Insert Payloads (built by the server, never deserialized from clients) ---

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub registration_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub text: String,
    pub date: DateTime<Utc>,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub text: String,
    pub date: DateTime<Utc>,
    pub user_id: UserId,
    pub post_id: PostId,
}

// --- Form Payloads (Input Schemas) ---

/// PostForm
///
/// The writable fields of a post. Anything else a client submits (`user`,
/// `date`, `id`) is dropped during deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct PostForm {
    #[serde(default)]
    #[validate(length(max = 255, message = "must be at most 255 characters"))]
    pub title: String,
    #[serde(default)]
    pub text: String,
}

/// CommentForm
///
/// `post` is accepted so that a tampered form still parses, but it is never
/// used: the target post comes from the route.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub post: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegistrationForm {
    #[serde(default)]
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub last_name: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    #[serde(default)]
    #[validate(must_match(other = "password", message = "passwords do not match"))]
    pub password2: String,
}

// --- Validation ---

/// FormErrors
///
/// Field name to message. An empty set means the form was accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, thiserror::Error)]
#[error("form rejected: {0:?}")]
pub struct FormErrors(pub BTreeMap<String, String>);

impl FormErrors {
    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::default();
        errors.insert(field, message);
        errors
    }

    pub fn insert(&mut self, field: &str, message: &str) {
        self.0.insert(field.to_string(), message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    fn into_result(self) -> Result<(), FormErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<validator::ValidationErrors> for FormErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut form = FormErrors::default();
        for (field, list) in errors.field_errors() {
            if let Some(first) = list.first() {
                let message = first
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| first.code.to_string());
                form.0.insert(field.to_string(), message);
            }
        }
        form
    }
}

fn validated<T: Validate>(form: &T) -> FormErrors {
    form.validate().err().map(FormErrors::from).unwrap_or_default()
}

/// Control characters other than line breaks and tabs. Postgres `TEXT` refuses
/// NUL outright, so these are rejected before they reach any store.
fn has_control_chars(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}

fn reject_control_chars(errors: &mut FormErrors, field: &str, value: &str) {
    if has_control_chars(value) {
        errors.insert(field, "contains invalid characters");
    }
}

impl NewPost {
    /// Builds a post from submitted fields. The owner and the timestamp are
    /// supplied by the caller; a missing owner rejects the form.
    pub fn from_form(
        form: PostForm,
        owner: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<NewPost, FormErrors> {
        let mut errors = validated(&form);
        reject_control_chars(&mut errors, "title", &form.title);
        reject_control_chars(&mut errors, "text", &form.text);
        let Some(user_id) = owner else {
            errors.insert("user", "cannot be empty");
            return Err(errors);
        };
        errors.into_result()?;

        Ok(NewPost {
            title: form.title,
            text: form.text,
            date: now,
            user_id,
        })
    }
}

impl NewComment {
    /// Builds a comment for `post_id`. Whatever `post` value the form carried
    /// is discarded.
    pub fn from_form(
        form: CommentForm,
        post_id: PostId,
        owner: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<NewComment, FormErrors> {
        let mut errors = FormErrors::default();
        if form.text.trim().is_empty() {
            errors.insert("text", "cannot be empty");
        }
        reject_control_chars(&mut errors, "text", &form.text);
        let Some(user_id) = owner else {
            errors.insert("user", "cannot be empty");
            return Err(errors);
        };
        errors.into_result()?;

        if let Some(claimed) = form.post.as_deref().filter(|p| *p != post_id.to_string()) {
            tracing::debug!(post_id, claimed, "ignoring client-supplied comment target");
        }

        Ok(NewComment {
            text: form.text,
            date: now,
            user_id,
            post_id,
        })
    }
}

impl RegistrationForm {
    pub fn check(&self) -> Result<(), FormErrors> {
        validated(self).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn post_takes_owner_and_date_from_the_server() {
        let at = now();
        let post = NewPost::from_form(
            PostForm { title: "Hello".into(), text: "World".into() },
            Some(3),
            at,
        )
        .unwrap();
        assert_eq!(post.user_id, 3);
        assert_eq!(post.date, at);
    }

    #[test]
    fn post_without_owner_is_rejected() {
        let errors = NewPost::from_form(PostForm::default(), None, now()).unwrap_err();
        assert_eq!(errors.get("user"), Some("cannot be empty"));
    }

    #[test]
    fn post_title_is_capped() {
        let form = PostForm { title: "x".repeat(256), text: String::new() };
        let errors = NewPost::from_form(form, Some(1), now()).unwrap_err();
        assert!(errors.get("title").is_some());
    }

    #[test]
    fn comment_target_comes_from_route_not_form() {
        let form = CommentForm { text: "Nice!".into(), post: Some("99".into()) };
        let comment = NewComment::from_form(form, 1, Some(7), now()).unwrap();
        assert_eq!(comment.post_id, 1);
        assert_eq!(comment.user_id, 7);
    }

    #[test]
    fn blank_comment_is_rejected() {
        let form = CommentForm { text: "   ".into(), post: None };
        let errors = NewComment::from_form(form, 1, Some(7), now()).unwrap_err();
        assert_eq!(errors.get("text"), Some("cannot be empty"));
    }

    #[test]
    fn control_characters_are_rejected() {
        let form = CommentForm { text: "a\0b".into(), post: None };
        let errors = NewComment::from_form(form, 1, Some(7), now()).unwrap_err();
        assert_eq!(errors.get("text"), Some("contains invalid characters"));

        let form = PostForm { title: "ti\u{7}tle".into(), text: "line\nbreak\tok".into() };
        let errors = NewPost::from_form(form, Some(1), now()).unwrap_err();
        assert!(errors.get("title").is_some());
        assert!(errors.get("text").is_none());
    }

    #[test]
    fn registration_reports_each_bad_field() {
        let form = RegistrationForm {
            email: "not-an-email".into(),
            first_name: "Ada".into(),
            last_name: String::new(),
            password: "short".into(),
            password2: "other".into(),
        };
        let errors = form.check().unwrap_err();
        assert!(errors.get("email").is_some());
        assert!(errors.get("last_name").is_some());
        assert!(errors.get("password").is_some());
        assert_eq!(errors.get("password2"), Some("passwords do not match"));
        assert!(errors.get("first_name").is_none());
    }

    #[test]
    fn membership_is_looked_up_by_role_name() {
        let mut auth = AuthRecord::default();
        auth.groups.insert(ADMIN_GROUP.to_string());
        assert!(auth.has_membership("admin"));
        assert!(!auth.has_membership("editor"));
        assert!(!auth.is_pending());
    }
}
