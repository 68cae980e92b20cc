//! Authentication orchestrator
//!
//! Composes the token codec, credential store, presence tracker and invitation
//! sender into the register / login / refresh / profile / online flows. Each
//! flow is a short linear protocol; no state is held between calls.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::database::{CredentialStore, InvitationStore};
use super::email::EmailSender;
use super::error::{AuthError, StoreError};
use super::jwt::{TokenCodec, INVITE_TTL};
use super::models::{Credential, Identity, Invitation, Role, TokenPair};
use super::password::{hash_password, validate_email, validate_password, verify_password};
use super::presence::PresenceTracker;

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    invitations: Arc<dyn InvitationStore>,
    codec: TokenCodec,
    presence: PresenceTracker,
    email: EmailSender,
    front_uri: String,
    store_timeout: Duration,
    /// Verified against when the email is unknown, so both login failures cost one Argon2 run
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        invitations: Arc<dyn InvitationStore>,
        codec: TokenCodec,
        presence: PresenceTracker,
        email: EmailSender,
        front_uri: String,
        store_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            invitations,
            codec,
            presence,
            email,
            front_uri,
            store_timeout,
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Invite-gated self registration
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        invite_token: &str,
    ) -> Result<Credential, AuthError> {
        let email = email.trim();
        validate_email(email).map_err(|e| AuthError::MalformedInput(e.to_string()))?;
        validate_password(password).map_err(|e| AuthError::MalformedInput(e.to_string()))?;

        let invited = self
            .codec
            .verify_invite(invite_token)
            .map_err(AuthError::InvalidInvite)?;
        if invited != email {
            return Err(AuthError::InviteEmailMismatch);
        }

        if self
            .bounded(self.credentials.find_by_email(email))
            .await?
            .is_some()
        {
            return Err(AuthError::AccountExists);
        }

        let password_hash = hash_blocking(password.to_string()).await?;
        let credential = self
            .bounded(self.credentials.create(email, &password_hash))
            .await
            .map_err(|e| match e {
                StoreError::Conflict => AuthError::AccountExists,
                other => AuthError::Store(other),
            })?;

        log::info!("Registered user {} ({})", credential.id, credential.email);
        Ok(credential)
    }

    /// Password login; unknown email and wrong password are indistinguishable
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let Some(credential) = self
            .bounded(self.credentials.find_by_email(email.trim()))
            .await?
        else {
            let dummy = self
                .dummy_hash
                .get_or_try_init(|| hash_blocking(uuid::Uuid::new_v4().to_string()))
                .await?;
            verify_blocking(password.to_string(), dummy.clone()).await?;
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_blocking(password.to_string(), credential.password_hash.clone()).await? {
            return Err(AuthError::InvalidCredentials);
        }

        self.issue_pair(&credential.id, credential.role)
    }

    /// Full rotation: a valid refresh token buys a brand new pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let (user_id, role) = self.codec.verify_refresh(refresh_token)?;
        self.issue_pair(&user_id, role)
    }

    /// Verifies a bearer access token
    pub fn authenticate(&self, access_token: &str) -> Result<Identity, AuthError> {
        let (user_id, role) = self.codec.verify_access(access_token)?;
        Ok(Identity { user_id, role })
    }

    pub async fn touch_online(&self, user_id: &str) -> Result<(), AuthError> {
        Ok(self.presence.touch(user_id).await?)
    }

    /// `_window` is accepted for API compatibility; the presence TTL is the only filter.
    pub async fn online_users(&self, _window: Duration) -> Result<Vec<String>, AuthError> {
        Ok(self.presence.list_online().await?)
    }

    pub async fn profile(&self, user_id: &str) -> Result<Credential, AuthError> {
        self.bounded(self.credentials.find_by_id(user_id))
            .await?
            .ok_or(AuthError::CredentialNotFound)
    }

    /// Issues an invite token, records it and mails the registration link
    pub async fn invite(&self, email: &str) -> Result<Invitation, AuthError> {
        let email = email.trim();
        validate_email(email).map_err(|e| AuthError::MalformedInput(e.to_string()))?;

        let token = self.codec.issue_invite(email)?;
        let invitation = self
            .bounded(self.invitations.create_invitation(email, &token, INVITE_TTL))
            .await
            .map_err(|e| match e {
                StoreError::Conflict => {
                    AuthError::AlreadyExists("an invitation for this email was already sent".into())
                }
                other => AuthError::Store(other),
            })?;

        let link = format!("{}/register?token={}", self.front_uri.trim_end_matches('/'), token);
        if let Err(e) = self.email.send_invitation_email(email, &link).await {
            log::error!("Failed to send invitation email to {}: {}", email, e);
            // nothing was delivered, so the email must stay invitable
            if let Err(cleanup) = self
                .bounded(self.invitations.delete_invitation(&invitation.id))
                .await
            {
                log::error!("Failed to drop unsent invitation for {}: {}", email, cleanup);
            }
            return Err(AuthError::EmailDelivery(e.to_string()));
        }

        log::info!("Invitation sent to {}", email);
        Ok(invitation)
    }

    /// Creates the configured super admin, or promotes the account if it exists
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<Credential, AuthError> {
        if let Some(mut existing) = self.bounded(self.credentials.find_by_email(email)).await? {
            if existing.role != Role::SuperAdmin {
                self.bounded(self.credentials.update_role(&existing.id, Role::SuperAdmin))
                    .await?;
                existing.role = Role::SuperAdmin;
                log::info!("Promoted {} to super admin", existing.email);
            }
            return Ok(existing);
        }
        validate_email(email).map_err(|e| AuthError::MalformedInput(e.to_string()))?;
        validate_password(password).map_err(|e| AuthError::MalformedInput(e.to_string()))?;

        let password_hash = hash_blocking(password.to_string()).await?;
        let mut admin = self
            .bounded(self.credentials.create(email, &password_hash))
            .await?;
        self.bounded(self.credentials.update_role(&admin.id, Role::SuperAdmin))
            .await?;
        admin.role = Role::SuperAdmin;

        log::info!("Bootstrapped super admin {}", admin.email);
        Ok(admin)
    }

    /// Removes invitations whose window has passed
    pub async fn purge_expired_invitations(&self) -> Result<usize, AuthError> {
        Ok(self
            .bounded(self.invitations.purge_expired_invitations())
            .await?)
    }

    fn issue_pair(&self, user_id: &str, role: Role) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.codec.issue_access(user_id, role)?,
            refresh_token: self.codec.issue_refresh(user_id, role)?,
        })
    }

    /// Applies the store deadline to a store call
    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

async fn hash_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Password(e.to_string()))?
        .map_err(|e| AuthError::Password(e.to_string()))
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Password(e.to_string()))?
        .map_err(|e| AuthError::Password(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::database::AuthDatabase;
    use crate::auth::email::MockEmailService;
    use crate::auth::error::TokenError;
    use crate::auth::jwt::JwtConfig;
    use crate::auth::models::{Claims, TokenPurpose};
    use crate::auth::presence::MemoryStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory credential + invitation store
    #[derive(Default)]
    struct FakeStore {
        users: Mutex<HashMap<String, Credential>>,
        invited: Mutex<Vec<String>>,
        offline: bool,
    }

    impl FakeStore {
        fn offline() -> Self {
            Self {
                offline: true,
                ..Default::default()
            }
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.offline {
                Err(StoreError::Timeout)
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CredentialStore for FakeStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
            self.check()?;
            let users = self.users.lock().unwrap();
            Ok(users.values().find(|u| u.email == email).cloned())
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<Credential>, StoreError> {
            self.check()?;
            Ok(self.users.lock().unwrap().get(id).cloned())
        }

        async fn create(&self, email: &str, password_hash: &str) -> Result<Credential, StoreError> {
            self.check()?;
            let mut users = self.users.lock().unwrap();
            if users.values().any(|u| u.email == email) {
                return Err(StoreError::Conflict);
            }
            let credential = Credential {
                id: format!("user_{}", users.len() + 1),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role: Role::User,
                created_at: "2024-01-01T00:00:00Z".to_string(),
            };
            users.insert(credential.id.clone(), credential.clone());
            Ok(credential)
        }

        async fn update_role(&self, id: &str, role: Role) -> Result<(), StoreError> {
            self.check()?;
            if let Some(user) = self.users.lock().unwrap().get_mut(id) {
                user.role = role;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl InvitationStore for FakeStore {
        async fn create_invitation(
            &self,
            email: &str,
            token: &str,
            _ttl: Duration,
        ) -> Result<Invitation, StoreError> {
            self.check()?;
            let mut invited = self.invited.lock().unwrap();
            if invited.iter().any(|e| e == email) {
                return Err(StoreError::Conflict);
            }
            invited.push(email.to_string());
            Ok(Invitation {
                id: email.to_string(),
                email: email.to_string(),
                token: token.to_string(),
                created_at: String::new(),
                expires_at: String::new(),
            })
        }

        async fn delete_invitation(&self, id: &str) -> Result<(), StoreError> {
            self.check()?;
            self.invited.lock().unwrap().retain(|e| e != id);
            Ok(())
        }

        async fn purge_expired_invitations(&self) -> Result<usize, StoreError> {
            self.check()?;
            Ok(0)
        }
    }

    fn build(store: Arc<FakeStore>, mock: Arc<MockEmailService>) -> AuthService {
        let codec = TokenCodec::new(JwtConfig::new(
            "access".to_string(),
            "refresh".to_string(),
            Duration::from_secs(900),
            Duration::from_secs(30 * 24 * 3600),
        ));
        let presence = PresenceTracker::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        AuthService::new(
            store.clone(),
            store,
            codec,
            presence,
            EmailSender::Mock(mock),
            "http://front".to_string(),
            Duration::from_secs(1),
        )
    }

    fn service() -> AuthService {
        build(Arc::new(FakeStore::default()), Arc::new(MockEmailService::new()))
    }

    async fn registered(service: &AuthService, email: &str, password: &str) -> Credential {
        let invite = service.codec().issue_invite(email).unwrap();
        service.register(email, password, &invite).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_with_valid_invite() {
        let service = service();
        let user = registered(&service, "a@b.com", "secret1").await;

        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "secret1");
        assert!(verify_password("secret1", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_register_rejects_mismatched_email() {
        let service = service();
        let invite = service.codec().issue_invite("a@b.com").unwrap();
        assert_matches!(
            service.register("other@b.com", "secret1", &invite).await,
            Err(AuthError::InviteEmailMismatch)
        );
    }

    #[tokio::test]
    async fn test_register_rejects_bad_invite() {
        let service = service();
        assert_matches!(
            service.register("a@b.com", "secret1", "garbage").await,
            Err(AuthError::InvalidInvite(TokenError::Invalid))
        );

        // an access token is not an invite
        let access = service.codec().issue_access("u", Role::User).unwrap();
        assert_matches!(
            service.register("a@b.com", "secret1", &access).await,
            Err(AuthError::InvalidInvite(TokenError::WrongPurpose))
        );
    }

    #[tokio::test]
    async fn test_register_rejects_expired_invite() {
        let service = service();
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: None,
            role: None,
            email: Some("a@b.com".to_string()),
            exp: now - 60,
            iat: now - 360,
            jti: "expired".to_string(),
            purpose: TokenPurpose::Invite,
        };
        let expired = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"access"),
        )
        .unwrap();

        let err = service.register("a@b.com", "secret1", &expired).await.unwrap_err();
        assert_matches!(err, AuthError::InvalidInvite(TokenError::Expired));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate() {
        let service = service();
        registered(&service, "a@b.com", "secret1").await;

        let invite = service.codec().issue_invite("a@b.com").unwrap();
        assert_matches!(
            service.register("a@b.com", "secret2", &invite).await,
            Err(AuthError::AccountExists)
        );
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let service = service();
        let invite = service.codec().issue_invite("a@b.com").unwrap();
        assert_matches!(
            service.register("a@b.com", "123", &invite).await,
            Err(AuthError::MalformedInput(_))
        );
        assert_matches!(
            service.register("not-an-email", "secret1", &invite).await,
            Err(AuthError::MalformedInput(_))
        );
    }

    #[tokio::test]
    async fn test_login_and_refresh_rotation() {
        let service = service();
        let user = registered(&service, "a@b.com", "secret1").await;

        let pair = service.login("a@b.com", "secret1").await.unwrap();
        assert!(!pair.access_token.is_empty());
        assert_ne!(pair.access_token, pair.refresh_token);
        assert_eq!(service.authenticate(&pair.access_token).unwrap().user_id, user.id);

        let rotated = service.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(rotated.access_token, pair.access_token);
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        // the superseded refresh token is not revoked
        assert!(service.refresh(&pair.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_failures_are_generic() {
        let service = service();
        registered(&service, "a@b.com", "secret1").await;

        let wrong_password = service.login("a@b.com", "nope-nope").await.unwrap_err();
        let unknown_user = service.login("x@b.com", "secret1").await.unwrap_err();
        assert_matches!(wrong_password, AuthError::InvalidCredentials);
        assert_matches!(unknown_user, AuthError::InvalidCredentials);
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let service = service();
        let access = service.codec().issue_access("u", Role::User).unwrap();
        assert_matches!(service.refresh(&access).await, Err(AuthError::Token(_)));
    }

    #[tokio::test]
    async fn test_refresh_keeps_role() {
        let service = service();
        let refresh = service.codec().issue_refresh("boss", Role::SuperAdmin).unwrap();
        let pair = service.refresh(&refresh).await.unwrap();
        assert_eq!(
            service.authenticate(&pair.access_token).unwrap(),
            Identity {
                user_id: "boss".to_string(),
                role: Role::SuperAdmin
            }
        );
    }

    #[tokio::test]
    async fn test_profile_and_online() {
        let service = service();
        let user = registered(&service, "a@b.com", "secret1").await;

        assert_eq!(service.profile(&user.id).await.unwrap().email, "a@b.com");
        assert_matches!(service.profile("ghost").await, Err(AuthError::CredentialNotFound));

        service.touch_online(&user.id).await.unwrap();
        assert_eq!(
            service.online_users(Duration::from_secs(300)).await.unwrap(),
            vec![user.id]
        );
    }

    #[tokio::test]
    async fn test_store_outage_is_infrastructure_error() {
        let service = build(Arc::new(FakeStore::offline()), Arc::new(MockEmailService::new()));
        let err = service.login("a@b.com", "secret1").await.unwrap_err();
        assert_matches!(err, AuthError::Store(StoreError::Timeout));
        assert!(err.status().is_server_error());
    }

    #[tokio::test]
    async fn test_invite_sends_link_and_rejects_duplicate() {
        let mock = Arc::new(MockEmailService::new());
        let service = build(Arc::new(FakeStore::default()), mock.clone());

        let invitation = service.invite("new@b.com").await.unwrap();
        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "new@b.com");
        assert_eq!(
            sent[0].1,
            format!("http://front/register?token={}", invitation.token)
        );
        assert_eq!(service.codec().verify_invite(&invitation.token).unwrap(), "new@b.com");

        assert_matches!(service.invite("new@b.com").await, Err(AuthError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_login_unknown_email_still_verifies_a_hash() {
        let service = service();
        assert!(service.dummy_hash.get().is_none());

        assert_matches!(
            service.login("ghost@b.com", "secret1").await,
            Err(AuthError::InvalidCredentials)
        );
        assert!(service.dummy_hash.get().is_some());
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_email_invitable() {
        let db = Arc::new(AuthDatabase::in_memory().unwrap());
        let service = AuthService::new(
            db.clone(),
            db,
            TokenCodec::new(JwtConfig::new(
                "access".to_string(),
                "refresh".to_string(),
                Duration::from_secs(900),
                Duration::from_secs(3600),
            )),
            PresenceTracker::new(Arc::new(MemoryStore::new()), Duration::from_secs(1)),
            EmailSender::Mock(Arc::new(MockEmailService::unreachable())),
            "http://front".to_string(),
            Duration::from_secs(1),
        );

        assert_matches!(service.invite("new@b.com").await, Err(AuthError::EmailDelivery(_)));
        // a retry hits the relay again instead of the duplicate guard
        assert_matches!(service.invite("new@b.com").await, Err(AuthError::EmailDelivery(_)));
    }

    #[tokio::test]
    async fn test_ensure_admin_promotes_existing_user() {
        let service = service();
        let user = registered(&service, "root@b.com", "secret1").await;
        assert_eq!(user.role, Role::User);

        let admin = service.ensure_admin("root@b.com", "rootpass").await.unwrap();
        assert_eq!(admin.id, user.id);
        assert_eq!(admin.role, Role::SuperAdmin);
        assert_eq!(service.profile(&user.id).await.unwrap().role, Role::SuperAdmin);
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let service = service();
        let first = service.ensure_admin("root@b.com", "rootpass").await.unwrap();
        assert_eq!(first.role, Role::SuperAdmin);

        let second = service.ensure_admin("root@b.com", "rootpass").await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(service.profile(&first.id).await.unwrap().role, Role::SuperAdmin);
    }
}
