use anyhow::Context;
use bloggy::{
    AppState, MIGRATOR,
    config::{AppConfig, Env},
    create_router,
    repository::{MemoryRepository, PostgresRepository, RepositoryState},
    setup::{SetupOptions, run_setup},
};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bloggy", version, about = "A minimal blog: posts, comments and accounts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default).
    Serve {
        /// Keep everything in process memory instead of Postgres. The setup
        /// account is created on start.
        #[arg(long)]
        memory: bool,
    },
    /// Create the initial admin user and group. Run once.
    Setup {
        #[arg(long, env = "SETUP_EMAIL")]
        email: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long, env = "SETUP_PASSWORD")]
        password: Option<String>,
    },
}

fn init_tracing(env: Env) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bloggy=debug,tower_http=info".into());

    match env {
        // Human-readable output while developing.
        Env::Local => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
        // One JSON object per line for log aggregation.
        Env::Production => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn postgres(config: &AppConfig) -> anyhow::Result<PostgresRepository> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .context("failed to connect to Postgres, check DATABASE_URL")?;

    MIGRATOR
        .run(&pool)
        .await
        .context("failed to apply migrations")?;

    Ok(PostgresRepository::new(pool))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load().context("invalid configuration")?;

    init_tracing(config.env);
    tracing::info!("bloggy starting in {:?} mode", config.env);

    match cli.command.unwrap_or(Command::Serve { memory: false }) {
        Command::Setup {
            email,
            first_name,
            last_name,
            password,
        } => {
            let defaults = SetupOptions::default();
            let options = SetupOptions {
                email: email.unwrap_or(defaults.email),
                first_name: first_name.unwrap_or(defaults.first_name),
                last_name: last_name.unwrap_or(defaults.last_name),
                password: password.unwrap_or(defaults.password),
            };
            let repo = postgres(&config).await?;
            run_setup(&repo, &config, options)
                .await
                .context("setup failed (has it already been run?)")?;
            Ok(())
        }
        Command::Serve { memory } => {
            let repo: RepositoryState = if memory {
                let repo = MemoryRepository::new();
                run_setup(&repo, &config, SetupOptions::default()).await?;
                tracing::warn!("using the in-memory store, data is lost on exit");
                Arc::new(repo)
            } else {
                Arc::new(postgres(&config).await?)
            };
            serve(AppState { repo, config }).await
        }
    }
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.bind_addr.clone();
    let app = create_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Listening on {}", addr);
    tracing::info!("API documentation at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
