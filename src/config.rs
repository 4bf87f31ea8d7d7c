use std::env;

/// AppConfig
///
/// Holds the application's entire configuration. Immutable once loaded and
/// pulled into handlers and extractors through `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the dev bypass header and log format.
    pub env: Env,
    // Which content store / directory backs the service.
    pub store: StoreBackend,
    // Postgres connection string. Required for `StoreBackend::Postgres`.
    pub db_url: Option<String>,
    // Identity provider (GoTrue) base URL and anon key.
    pub auth_url: String,
    pub auth_api_key: String,
    // HS256 secret used to verify provider access tokens.
    pub jwt_secret: String,
    pub bind_addr: String,
}

/// Env
///
/// Runtime context: local development conveniences vs hardened production.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// StoreBackend
///
/// `Memory` seeds demo posts and directory records and needs no database.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

impl Default for AppConfig {
    /// Safe, non-panicking values for test state scaffolding.
    fn default() -> Self {
        Self {
            env: Env::Local,
            store: StoreBackend::Memory,
            db_url: None,
            auth_url: "http://localhost:9999".to_string(),
            auth_api_key: "local-anon-key".to_string(),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables at startup.
    ///
    /// # Panics
    /// Fails fast when a variable required by the selected environment or
    /// store is missing, so the service never starts half-configured.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let store = match env::var("CONTENT_STORE").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            _ => StoreBackend::Postgres,
        };

        let db_url = match store {
            StoreBackend::Postgres => Some(
                env::var("DATABASE_URL")
                    .expect("FATAL: DATABASE_URL required when CONTENT_STORE=postgres"),
            ),
            StoreBackend::Memory => env::var("DATABASE_URL").ok(),
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        match env {
            Env::Local => Self {
                env,
                store,
                db_url,
                auth_url: env::var("SUPABASE_URL")
                    .unwrap_or_else(|_| "http://localhost:9999".to_string()),
                auth_api_key: env::var("SUPABASE_KEY")
                    .unwrap_or_else(|_| "local-anon-key".to_string()),
                jwt_secret: env::var("SUPABASE_JWT_SECRET")
                    .unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
                bind_addr,
            },
            Env::Production => Self {
                env,
                store,
                db_url,
                auth_url: env::var("SUPABASE_URL").expect("FATAL: SUPABASE_URL required in prod"),
                auth_api_key: env::var("SUPABASE_KEY").expect("FATAL: SUPABASE_KEY required in prod"),
                jwt_secret: env::var("SUPABASE_JWT_SECRET")
                    .expect("FATAL: SUPABASE_JWT_SECRET must be set in production."),
                bind_addr,
            },
        }
    }
}
