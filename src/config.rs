//! Runtime configuration, from flags or the environment

use clap::Parser;
use std::time::Duration;

use crate::auth::JwtConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "cargo_hub", version, about)]
pub struct AppConfig {
    /// Address to bind the HTTP server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short = 'p', long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Path to the SQLite database holding users and invitations
    #[arg(long, env = "DATABASE_PATH", default_value = "data/cargo_hub.db")]
    pub database_path: String,

    /// Secret for access and invite tokens
    #[arg(long, env = "JWT_SECRET_ACCESS", hide_env_values = true)]
    pub access_secret: String,

    /// Secret for refresh tokens
    #[arg(long, env = "JWT_SECRET_REFRESH", hide_env_values = true)]
    pub refresh_secret: String,

    #[arg(long, env = "ACCESS_TTL_SECS", default_value_t = 15 * 60)]
    pub access_ttl_secs: u64,

    #[arg(long, env = "REFRESH_TTL_SECS", default_value_t = 30 * 24 * 60 * 60)]
    pub refresh_ttl_secs: u64,

    /// Redis URL for presence; in-memory presence when absent
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Deadline for every store call
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = 2000)]
    pub store_timeout_ms: u64,

    /// Mark the refresh cookie Secure
    #[arg(long, env = "SECURE_COOKIES", default_value_t = false)]
    pub secure_cookies: bool,

    /// Frontend origin, used for CORS and invitation links
    #[arg(long, env = "FRONT_URI", default_value = "http://localhost:3000")]
    pub front_uri: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Write rotated log files here instead of stderr
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<String>,

    /// Super admin created at startup if missing
    #[arg(long, env = "ADMIN_EMAIL", requires = "admin_password")]
    pub admin_email: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,
}

impl AppConfig {
    pub fn jwt_config(&self) -> JwtConfig {
        JwtConfig::new(
            self.access_secret.clone(),
            self.refresh_secret.clone(),
            Duration::from_secs(self.access_ttl_secs),
            Duration::from_secs(self.refresh_ttl_secs),
        )
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }
}
