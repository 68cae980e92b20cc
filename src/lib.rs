//! # Cargo Hub
//!
//! Authentication and session core for a cargo logistics REST API.
//!
//! ## Features
//!
//! - **Accounts**: invite-gated registration, Argon2 password storage in SQLite
//! - **Sessions**: short-lived access JWTs, rotating refresh JWTs in an HttpOnly cookie
//! - **Presence**: sliding-TTL "online" markers in Redis (or in memory)
//! - **Invitations**: role-gated, delivered by email
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cargo_hub::servers::{ApiServer, ApiServerConfig};
//! ```

// ============================================================================
// PUBLIC API MODULES
// ============================================================================

/// Tokens, credentials, presence and the HTTP surface
pub mod auth;

/// Runtime configuration
pub mod config;

/// Logger setup
pub mod logging;

/// HTTP server
pub mod servers;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::AppConfig;
pub use servers::{ApiServer, ApiServerConfig};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Top-level error type, used at startup and by the server
#[derive(Debug, thiserror::Error)]
pub enum CargoHubError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] auth::StoreError),

    #[error("Auth error: {0}")]
    Auth(#[from] auth::AuthError),

    #[error("Logger error: {0}")]
    Logger(#[from] flexi_logger::FlexiLoggerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, CargoHubError>;

// ============================================================================
// LIBRARY VERSION INFO
// ============================================================================

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
