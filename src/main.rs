use blogicum::{
    AppState, Templates,
    config::{AppConfig, Env},
    create_router,
    repository::{InMemoryRepository, PostgresRepository, RepositoryState},
    storage::{S3StorageClient, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, the repository, picture storage and templates, then
/// serves HTTP until the process is stopped.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins over the defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "blogicum=debug,tower_http=info,axum=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Blogicum starting in {:?} mode", config.env);

    // 3. Persistence
    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            let repo = PostgresRepository::new(pool);
            repo.migrate()
                .await
                .expect("FATAL: Failed to apply database migrations.");
            Arc::new(repo)
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set; using the in-memory repository. Data is lost on exit."
            );
            Arc::new(InMemoryRepository::new())
        }
    };

    for username in &config.staff_usernames {
        match repo.set_staff(username, true).await {
            Ok(true) => tracing::info!("Granted staff rights to {}", username),
            Ok(false) => tracing::warn!("STAFF_USERNAMES names unknown user {}", username),
            Err(e) => tracing::error!("Could not grant staff rights to {}: {:?}", username, e),
        }
    }

    // 4. Picture storage (S3/MinIO)
    let s3_client = S3StorageClient::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
        &config.media_public_url,
    )
    .await;

    // Local MinIO starts empty.
    if config.env == Env::Local {
        s3_client.ensure_bucket_exists().await;
    }
    let storage = Arc::new(s3_client) as StorageState;

    // 5. Templates
    let templates = Arc::new(Templates::new().expect("FATAL: Page templates failed to compile."));

    // 6. Router and server
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState {
        repo,
        storage,
        config,
        templates,
    });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Cannot bind {}: {}", bind_addr, e));
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
