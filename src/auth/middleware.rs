//! HTTP authentication middleware
//!
//! Extracts and validates the bearer access token, marks the caller online and
//! hands the typed [`Identity`] to downstream handlers via request extensions.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::error::AuthError;
use super::models::{Identity, Role};
use super::routes::AuthState;

/// Roles allowed to issue invitations
pub const INVITER_ROLES: &[Role] = &[Role::Editor, Role::SuperAdmin];

/// Extract the token from `Authorization: Bearer <token>`
pub fn extract_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() => {
            Ok(token)
        }
        _ => Err(AuthError::MissingToken),
    }
}

/// Gate for bearer-protected routes
pub async fn require_bearer(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = state.service.authenticate(extract_token(request.headers())?)?;

    if let Err(e) = state.service.touch_online(&identity.user_id).await {
        log::warn!("Presence update failed for {}: {}", identity.user_id, e);
    }

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

impl Identity {
    /// Authorization step that runs after authentication
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AuthError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}
