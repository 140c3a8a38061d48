// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Default cadence of the expiry sweep, in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Role assigned to self-registered accounts. Attempt and credit routes require it.
pub const STUDENT_ROLE: &str = "student";
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub sweep_interval_secs: u64,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = parse_or(env::var("JWT_EXPIRATION").ok(), 86_400);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let sweep_interval_secs = parse_or(
            env::var("EXPIRY_SWEEP_INTERVAL_SECS").ok(),
            DEFAULT_SWEEP_INTERVAL_SECS,
        )
        .max(1);

        let port = parse_or(env::var("PORT").ok(), 3000);

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            sweep_interval_secs,
            port,
        }
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
