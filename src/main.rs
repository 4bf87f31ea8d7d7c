use blog_portal::{
    AppState, MemoryDirectory, MemoryRepository, MutationRunner, PostgresDirectory,
    PostgresRepository, SupabaseIdentityProvider,
    config::{AppConfig, Env, StoreBackend},
    create_router,
    directory::DirectoryState,
    identity::IdentityState,
    repository::RepositoryState,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initialises logging, builds the content store,
/// directory and identity provider, then serves the router.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "blog_portal=debug,tower_http=info".into());

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

    tracing::info!("Application starting in {:?} mode with {:?} store", config.env, config.store);

    // 3. Content store + directory
    let (repo, directory): (RepositoryState, DirectoryState) = match config.store {
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; data is lost on restart");
            (
                Arc::new(MemoryRepository::seeded()),
                Arc::new(MemoryDirectory::seeded()),
            )
        }
        StoreBackend::Postgres => {
            let db_url = config
                .db_url
                .as_deref()
                .expect("FATAL: DATABASE_URL required for the postgres store");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            // LOCAL-ONLY: apply the schema on startup.
            if config.env == Env::Local {
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .expect("FATAL: Failed to run migrations");
            }

            (
                Arc::new(PostgresRepository::new(pool.clone())),
                Arc::new(PostgresDirectory::new(pool)),
            )
        }
    };

    // 4. Identity provider
    let identity: IdentityState = Arc::new(SupabaseIdentityProvider::new(
        &config.auth_url,
        &config.auth_api_key,
        &config.jwt_secret,
    ));

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        directory,
        identity,
        mutations: MutationRunner::new(),
        config,
    };

    // 5. Router and server
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server exited with an error");
    }
}
