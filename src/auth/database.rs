//! SQLite database operations for authentication

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::StoreError;
use super::models::{Credential, Invitation, Role};

/// Lookup/creation of user credentials. A missing user is `Ok(None)`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Credential>, StoreError>;

    /// Creates a USER-role account; a taken email is `StoreError::Conflict`
    async fn create(&self, email: &str, password_hash: &str) -> Result<Credential, StoreError>;

    async fn update_role(&self, id: &str, role: Role) -> Result<(), StoreError>;
}

/// Bookkeeping of sent invitations
#[async_trait]
pub trait InvitationStore: Send + Sync {
    /// A live invitation for the same email is `StoreError::Conflict`
    async fn create_invitation(
        &self,
        email: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<Invitation, StoreError>;

    /// Drops the invitation with this id; unknown ids are a no-op
    async fn delete_invitation(&self, id: &str) -> Result<(), StoreError>;

    async fn purge_expired_invitations(&self) -> Result<usize, StoreError>;
}

/// Database connection wrapper
#[derive(Clone)]
pub struct AuthDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl AuthDatabase {
    /// Create a new database connection and initialize tables
    pub fn new(path: &str) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create in-memory database (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'USER',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS invitations (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                token TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
            CREATE INDEX IF NOT EXISTS idx_invitations_expires ON invitations(expires_at);
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await?
    }
}

/// Fixed-width UTC timestamps so stored values order lexically
fn timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

const USER_COLUMNS: &str = "id, email, password_hash, role, created_at";

fn credential_from_row(row: &Row<'_>) -> rusqlite::Result<Credential> {
    let role: String = row.get(3)?;
    Ok(Credential {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: role.parse().unwrap_or(Role::User),
        created_at: row.get(4)?,
    })
}

fn find_user(conn: &Connection, column: &str, value: &str) -> Result<Option<Credential>, StoreError> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let user = conn
        .query_row(&sql, params![value], credential_from_row)
        .optional()?;
    Ok(user)
}

#[async_trait]
impl CredentialStore for AuthDatabase {
    async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let email = email.to_string();
        self.with_conn(move |conn| find_user(conn, "email", &email)).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| find_user(conn, "id", &id)).await
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<Credential, StoreError> {
        let credential = Credential {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role: Role::User,
            created_at: timestamp(chrono::Utc::now()),
        };

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (id, email, password_hash, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    credential.id,
                    credential.email,
                    credential.password_hash,
                    credential.role.as_str(),
                    credential.created_at,
                ],
            )
            .map_err(StoreError::from_sqlite)?;
            Ok(credential)
        })
        .await
    }

    async fn update_role(&self, id: &str, role: Role) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![role.as_str(), id],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl InvitationStore for AuthDatabase {
    async fn create_invitation(
        &self,
        email: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<Invitation, StoreError> {
        let now = chrono::Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(5));
        let invitation = Invitation {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            token: token.to_string(),
            created_at: timestamp(now),
            expires_at: timestamp(now + ttl),
        };

        self.with_conn(move |conn| {
            // an expired row for the same email must not block a fresh invite
            conn.execute(
                "DELETE FROM invitations WHERE email = ?1 AND expires_at < ?2",
                params![invitation.email, invitation.created_at],
            )?;
            conn.execute(
                "INSERT INTO invitations (id, email, token, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    invitation.id,
                    invitation.email,
                    invitation.token,
                    invitation.created_at,
                    invitation.expires_at,
                ],
            )
            .map_err(StoreError::from_sqlite)?;
            Ok(invitation)
        })
        .await
    }

    async fn delete_invitation(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM invitations WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    async fn purge_expired_invitations(&self) -> Result<usize, StoreError> {
        let now = timestamp(chrono::Utc::now());
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM invitations WHERE expires_at < ?1",
                params![now],
            )?;
            Ok(deleted)
        })
        .await
    }
}
