use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{
    Comment, CommentForm, FormErrors, LoginForm, Post, PostForm, PostId, RegistrationForm,
};

// Page documents: the data a template receives for each view. Responses are
// JSON; a front end renders them.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Text,
    Password,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FormField {
    pub name: String,
    pub kind: FieldKind,
    pub value: String,
}

impl FormField {
    fn new(name: &str, kind: FieldKind, value: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            value: value.to_string(),
        }
    }
}

/// FormView
///
/// A form as shown to the user: where it posts to, its writable fields with
/// the values to prefill, and the errors of the last rejected submission.
/// Server-assigned fields never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FormView {
    pub action: String,
    pub fields: Vec<FormField>,
    pub errors: FormErrors,
}

impl FormView {
    pub fn comment(post_id: PostId, form: &CommentForm) -> Self {
        Self {
            action: format!("/post/{post_id}"),
            fields: vec![FormField::new("text", FieldKind::Text, &form.text)],
            errors: FormErrors::default(),
        }
    }

    pub fn post(form: &PostForm) -> Self {
        Self {
            action: "/new".to_string(),
            fields: vec![
                FormField::new("title", FieldKind::String, &form.title),
                FormField::new("text", FieldKind::Text, &form.text),
            ],
            errors: FormErrors::default(),
        }
    }

    pub fn login(form: &LoginForm) -> Self {
        Self {
            action: "/auth/login".to_string(),
            fields: vec![
                FormField::new("email", FieldKind::String, &form.email),
                FormField::new("password", FieldKind::Password, ""),
            ],
            errors: FormErrors::default(),
        }
    }

    pub fn register(form: &RegistrationForm) -> Self {
        Self {
            action: "/auth/register".to_string(),
            fields: vec![
                FormField::new("email", FieldKind::String, &form.email),
                FormField::new("first_name", FieldKind::String, &form.first_name),
                FormField::new("last_name", FieldKind::String, &form.last_name),
                FormField::new("password", FieldKind::Password, ""),
                FormField::new("password2", FieldKind::Password, ""),
            ],
            errors: FormErrors::default(),
        }
    }

    pub fn with_errors(mut self, errors: FormErrors) -> Self {
        self.errors = errors;
        self
    }
}

/// GET `/`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IndexPage {
    pub posts: Vec<Post>,
}

/// GET/POST `/post/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostPage {
    pub post: Post,
    pub comments: Vec<Comment>,
    pub form: FormView,
}

/// GET/POST `/new`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPostPage {
    pub form: FormView,
}

/// AuthPage
///
/// Every auth view. `template` is `"auth"` when the single shared template
/// is configured, otherwise the name of the action.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthPage {
    pub template: String,
    pub action: String,
    pub form: FormView,
}

impl AuthPage {
    pub fn new(action: &str, single_template: bool, form: FormView) -> Self {
        let template = if single_template { "auth" } else { action };
        Self {
            template: template.to_string(),
            action: action.to_string(),
            form,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_values_are_never_echoed() {
        let form = RegistrationForm {
            email: "a@b.co".into(),
            password: "hunter22".into(),
            password2: "hunter22".into(),
            ..Default::default()
        };
        let view = FormView::register(&form);
        assert!(view.fields.iter().all(|f| f.value != "hunter22"));
        assert_eq!(view.fields[0].value, "a@b.co");
    }

    #[test]
    fn auth_template_follows_configuration() {
        let shared = AuthPage::new("login", true, FormView::login(&LoginForm::default()));
        assert_eq!(shared.template, "auth");
        let own = AuthPage::new("login", false, FormView::login(&LoginForm::default()));
        assert_eq!(own.template, "login");
    }
}
