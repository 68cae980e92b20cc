//! Authentication and session core
//!
//! - Invite-gated registration with email/password
//! - Access/refresh JWT pairs, refresh rotation via an HttpOnly cookie
//! - Bearer request gate that tracks online presence
//! - Role-gated invitations delivered by email

pub mod database;
pub mod email;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod presence;
pub mod routes;
pub mod service;

pub use database::{AuthDatabase, CredentialStore, InvitationStore};
pub use email::EmailSender;
pub use error::{AuthError, StoreError, TokenError};
pub use jwt::{JwtConfig, TokenCodec};
pub use models::*;
pub use presence::{KeyValueStore, MemoryStore, PresenceTracker, RedisStore};
pub use routes::{auth_router, AuthState};
pub use service::AuthService;
