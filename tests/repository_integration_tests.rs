//! Postgres-backed repository tests. They need a reachable database:
//! `DATABASE_URL=... cargo test -- --ignored`.

use bloggy::{
    AppError, MIGRATOR,
    models::{NewComment, NewPost, NewUser, User},
    repository::{PostgresRepository, Repository},
};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        MIGRATOR
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// A user with an email unique to this run, so tests can share a database.
fn new_user(tag: &str) -> NewUser {
    NewUser {
        email: format!("{tag}-{}@test.com", Uuid::new_v4().simple()),
        first_name: "Test".to_string(),
        last_name: tag.to_string(),
        password_hash: "not-a-real-hash".to_string(),
        registration_key: None,
    }
}

async fn create_user(repo: &PostgresRepository, tag: &str) -> User {
    repo.create_user(new_user(tag))
        .await
        .expect("Failed to create test user")
}

// --- Tests ---

#[tokio::test]
#[ignore]
async fn test_create_and_get_post() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let author = create_user(&repo, "author").await;

    let created = repo
        .create_post(NewPost {
            title: "Integration".to_string(),
            text: "Body".to_string(),
            date: Utc::now(),
            user_id: author.id,
        })
        .await
        .unwrap();

    let fetched = repo.get_post(created.id).await.unwrap().expect("post exists");
    assert_eq!(fetched.title, "Integration");
    assert_eq!(fetched.user_id, author.id);

    assert!(repo.get_post(-1).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_comments_are_newest_first_and_scoped_to_post() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let author = create_user(&repo, "commenter").await;
    let now = Utc::now();

    let mut post_ids = Vec::new();
    for title in ["one", "two"] {
        let post = repo
            .create_post(NewPost {
                title: title.to_string(),
                text: String::new(),
                date: now,
                user_id: author.id,
            })
            .await
            .unwrap();
        post_ids.push(post.id);
    }

    for (text, minutes) in [("old", 1), ("new", 5)] {
        repo.create_comment(NewComment {
            text: text.to_string(),
            date: now + Duration::minutes(minutes),
            user_id: author.id,
            post_id: post_ids[0],
        })
        .await
        .unwrap();
    }

    let comments = repo.list_comments(post_ids[0]).await.unwrap();
    let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["new", "old"]);
    assert!(repo.list_comments(post_ids[1]).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_comment_on_missing_post_fails() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let author = create_user(&repo, "orphan").await;

    let result = repo
        .create_comment(NewComment {
            text: "nowhere".to_string(),
            date: Utc::now(),
            user_id: author.id,
            post_id: -1,
        })
        .await;
    assert!(matches!(result, Err(AppError::Database(_))));
}

#[tokio::test]
#[ignore]
async fn test_duplicate_email_is_conflict() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = new_user("dup");

    repo.create_user(user.clone()).await.unwrap();
    let result = repo.create_user(user).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
#[ignore]
async fn test_registration_key_confirms_once() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let key = Uuid::new_v4().simple().to_string();

    let mut user = new_user("pending");
    user.registration_key = Some(key.clone());
    let created = repo.create_user(user).await.unwrap();
    assert!(created.auth.is_pending());

    let confirmed = repo.confirm_registration(&key).await.unwrap().expect("key matches");
    assert_eq!(confirmed.id, created.id);
    assert!(!confirmed.auth.is_pending());
    assert!(repo.confirm_registration(&key).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_bootstrap_admin_links_user_and_group() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let role = format!("admin-{}", Uuid::new_v4().simple());

    let (user, group) = repo.bootstrap_admin(new_user("boot"), &role).await.unwrap();
    assert_eq!(group.role, role);

    let reloaded = repo.get_user(user.id).await.unwrap().expect("user exists");
    assert!(reloaded.has_membership(&role));

    // Same group again: the whole bootstrap is rolled back.
    let second = new_user("boot-again");
    let email = second.email.clone();
    let result = repo.bootstrap_admin(second, &role).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(repo.find_user_by_email(&email).await.unwrap().is_none());
}
