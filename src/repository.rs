use crate::{
    error::{AppError, Result},
    models::{
        AuthRecord, Comment, Group, NewComment, NewPost, NewUser, Post, PostId, User, UserId,
    },
};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::sync::RwLock;

/// Repository Trait
///
/// The persistence contract used by the handlers, the session extractor and
/// the `setup` command. Implemented over Postgres for real deployments and in
/// memory for tests and throwaway runs.
///
/// Ordering contract: every listing is newest first (`date DESC`), with ties
/// broken by descending id.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Posts ---
    async fn list_posts(&self) -> Result<Vec<Post>>;
    async fn get_post(&self, id: PostId) -> Result<Option<Post>>;
    async fn create_post(&self, post: NewPost) -> Result<Post>;

    // --- Comments ---
    async fn list_comments(&self, post_id: PostId) -> Result<Vec<Comment>>;
    async fn create_comment(&self, comment: NewComment) -> Result<Comment>;

    // --- Users & Groups ---
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> Result<User>;
    /// Clears the pending registration key; `None` if no account holds it.
    async fn confirm_registration(&self, key: &str) -> Result<Option<User>>;
    /// Creates `user`, creates the group `role`, and makes the user a member,
    /// all or nothing. Not idempotent: a second run conflicts.
    async fn bootstrap_admin(&self, user: NewUser, role: &str) -> Result<(User, Group)>;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

// --- Postgres ---

/// PostgresRepository
///
/// `Repository` backed by the schema in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_user(&self, row: Option<UserRow>) -> Result<Option<User>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let groups = sqlx::query_scalar::<_, String>(
            r#"
            SELECT g.role
            FROM auth_groups g
            JOIN auth_memberships m ON m.group_id = g.id
            WHERE m.user_id = $1
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_user(groups.into_iter().collect())))
    }
}

/// Flat `users` row; groups are loaded separately.
#[derive(FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    registration_key: Option<String>,
}

impl UserRow {
    fn into_user(self, groups: BTreeSet<String>) -> User {
        User {
            id: self.id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            auth: AuthRecord {
                password_hash: self.password_hash,
                registration_key: self.registration_key,
                groups,
            },
        }
    }
}

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, registration_key";

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_posts(&self) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            "SELECT id, title, text, date, user_id FROM posts ORDER BY date DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            "SELECT id, title, text, date, user_id FROM posts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn create_post(&self, post: NewPost) -> Result<Post> {
        let created = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (title, text, date, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, text, date, user_id
            "#,
        )
        .bind(post.title)
        .bind(post.text)
        .bind(post.date)
        .bind(post.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list_comments(&self, post_id: PostId) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, text, date, user_id, post_id
            FROM comments
            WHERE post_id = $1
            ORDER BY date DESC, id DESC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        // The post_id foreign key is the last line of defence if the post
        // vanished after the handler looked it up.
        let created = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (text, date, user_id, post_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, text, date, user_id, post_id
            "#,
        )
        .bind(comment.text)
        .bind(comment.date)
        .bind(comment.user_id)
        .bind(comment.post_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.load_user(row).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        self.load_user(row).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, first_name, last_name, password_hash, registration_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.password_hash)
        .bind(user.registration_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_user(BTreeSet::new()))
    }

    async fn confirm_registration(&self, key: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET registration_key = NULL
            WHERE registration_key = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        self.load_user(row).await
    }

    async fn bootstrap_admin(&self, user: NewUser, role: &str) -> Result<(User, Group)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, first_name, last_name, password_hash, registration_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.password_hash)
        .bind(user.registration_key)
        .fetch_one(&mut *tx)
        .await?;

        let group = sqlx::query_as::<_, Group>(
            "INSERT INTO auth_groups (role) VALUES ($1) RETURNING id, role",
        )
        .bind(role)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO auth_memberships (user_id, group_id) VALUES ($1, $2)")
            .bind(row.id)
            .bind(group.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let user = row.into_user(BTreeSet::from([group.role.clone()]));
        Ok((user, group))
    }
}

// --- In-Memory ---

/// Per-table id sequences, mirroring `BIGSERIAL`.
#[derive(Default)]
struct Sequence(i64);

impl Sequence {
    fn next(&mut self) -> i64 {
        self.0 += 1;
        self.0
    }
}

#[derive(Default)]
struct MemoryStore {
    users: BTreeMap<UserId, User>,
    groups: Vec<Group>,
    posts: BTreeMap<PostId, Post>,
    comments: Vec<Comment>,
    user_ids: Sequence,
    group_ids: Sequence,
    post_ids: Sequence,
    comment_ids: Sequence,
}

impl MemoryStore {
    fn insert_user(&mut self, user: NewUser) -> Result<User> {
        if self.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("users_email_key".to_string()));
        }
        let id = self.user_ids.next();
        let created = User {
            id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            auth: AuthRecord {
                password_hash: user.password_hash,
                registration_key: user.registration_key,
                groups: BTreeSet::new(),
            },
        };
        self.users.insert(id, created.clone());
        Ok(created)
    }
}

/// MemoryRepository
///
/// Process-local `Repository`. Each table numbers its rows from 1 like a
/// Postgres sequence, and each call is atomic under a single lock.
#[derive(Default)]
pub struct MemoryRepository {
    store: RwLock<MemoryStore>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, i64)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_posts(&self) -> Result<Vec<Post>> {
        let store = self.store.read().await;
        let mut posts: Vec<Post> = store.posts.values().cloned().collect();
        newest_first(&mut posts, |p| (p.date, p.id));
        Ok(posts)
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        Ok(self.store.read().await.posts.get(&id).cloned())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post> {
        let mut store = self.store.write().await;
        if !store.users.contains_key(&post.user_id) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "post owner {} does not exist",
                post.user_id
            )));
        }
        let id = store.post_ids.next();
        let created = Post {
            id,
            title: post.title,
            text: post.text,
            date: post.date,
            user_id: post.user_id,
        };
        store.posts.insert(id, created.clone());
        Ok(created)
    }

    async fn list_comments(&self, post_id: PostId) -> Result<Vec<Comment>> {
        let store = self.store.read().await;
        let mut comments: Vec<Comment> = store
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        newest_first(&mut comments, |c| (c.date, c.id));
        Ok(comments)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        let mut store = self.store.write().await;
        if !store.posts.contains_key(&comment.post_id) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "comment target post {} does not exist",
                comment.post_id
            )));
        }
        let id = store.comment_ids.next();
        let created = Comment {
            id,
            text: comment.text,
            date: comment.date,
            user_id: comment.user_id,
            post_id: comment.post_id,
        };
        store.comments.push(created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.store.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let store = self.store.read().await;
        Ok(store.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.store.write().await.insert_user(user)
    }

    async fn confirm_registration(&self, key: &str) -> Result<Option<User>> {
        let mut store = self.store.write().await;
        let user = store
            .users
            .values_mut()
            .find(|u| u.auth.registration_key.as_deref() == Some(key));
        Ok(user.map(|u| {
            u.auth.registration_key = None;
            u.clone()
        }))
    }

    async fn bootstrap_admin(&self, user: NewUser, role: &str) -> Result<(User, Group)> {
        let mut store = self.store.write().await;
        if store.groups.iter().any(|g| g.role == role) {
            return Err(AppError::Conflict("auth_groups_role_key".to_string()));
        }
        let mut created = store.insert_user(user)?;
        let group = Group {
            id: store.group_ids.next(),
            role: role.to_string(),
        };
        store.groups.push(group.clone());

        created.auth.groups.insert(group.role.clone());
        store.users.insert(created.id, created.clone());
        Ok((created, group))
    }
}
