use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::with_security_headers;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/eventhub";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";
const DEFAULT_MIDTRANS_BASE_URL: &str = crate::gateway::midtrans::SANDBOX_BASE_URL;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Upper bound on row-lock waits inside a unit of work.
    pub lock_timeout_ms: u64,
    pub bind_addr: SocketAddr,
    pub production: bool,
    pub cors_allowed_origins: Vec<String>,
    pub sweeper_interval: Duration,
    pub payment: PaymentConfig,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Midtrans is used when a server key is configured, the mock gateway otherwise.
    pub midtrans_server_key: Option<String>,
    pub midtrans_base_url: String,
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Config: invalid value for {}, using default", key);
                default
            }
        },
        Err(_) => default,
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        let default_addr: SocketAddr = DEFAULT_BIND_ADDR
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 3001)));

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 5),
            lock_timeout_ms: parsed_or("DATABASE_LOCK_TIMEOUT_MS", 5_000),
            bind_addr: parsed_or("BIND_ADDR", default_addr),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
            cors_allowed_origins: split_origins(
                &env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
            sweeper_interval: Duration::from_secs(parsed_or("SWEEPER_INTERVAL_SECS", 60)),
            payment: PaymentConfig {
                midtrans_server_key: env::var("MIDTRANS_SERVER_KEY")
                    .ok()
                    .filter(|key| !key.trim().is_empty()),
                midtrans_base_url: env::var("MIDTRANS_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_MIDTRANS_BASE_URL.to_string()),
            },
        }
    }
}
