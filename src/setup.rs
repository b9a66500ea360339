use crate::{
    auth,
    config::AppConfig,
    error::Result,
    models::{ADMIN_GROUP, NewUser, User},
    repository::Repository,
};

/// SetupOptions
///
/// The account created by `bloggy setup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOptions {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            email: "marcus@teste.com".to_string(),
            first_name: "Marcus".to_string(),
            last_name: "Pessoa".to_string(),
            password: "12m34a56r".to_string(),
        }
    }
}

/// run_setup
///
/// One-shot bootstrap: creates the default user and the `admin` group, and
/// makes the user a member, in a single commit. Running it twice fails with a
/// conflict on the second run; nothing is partially written.
pub async fn run_setup(
    repo: &dyn Repository,
    config: &AppConfig,
    options: SetupOptions,
) -> Result<User> {
    let user = NewUser {
        email: options.email.trim().to_lowercase(),
        first_name: options.first_name,
        last_name: options.last_name,
        password_hash: auth::hash_password(&options.password, &config.auth.hmac_key)?,
        registration_key: None,
    };

    let (user, group) = repo.bootstrap_admin(user, ADMIN_GROUP).await?;
    tracing::info!(
        user_id = user.id,
        email = %user.email,
        group = %group.role,
        "setup complete"
    );
    Ok(user)
}
