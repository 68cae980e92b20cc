//! Authentication REST API routes

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use super::{
    error::AuthError,
    middleware::{extract_token, require_bearer, INVITER_ROLES},
    models::*,
    presence::PRESENCE_TTL,
    service::AuthService,
};

pub const REFRESH_COOKIE: &str = "refresh_token";

/// Shared authentication state
pub struct AuthState {
    pub service: AuthService,
    pub secure_cookies: bool,
}

impl AuthState {
    pub fn new(service: AuthService, secure_cookies: bool) -> Self {
        Self {
            service,
            secure_cookies,
        }
    }

    fn refresh_cookie(&self, token: String) -> Cookie<'static> {
        let max_age = self.service.codec().config().refresh_ttl().as_secs() as i64;
        Cookie::build((REFRESH_COOKIE, token))
            .http_only(true)
            .path("/")
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .max_age(time::Duration::seconds(max_age))
            .build()
    }

    fn cleared_cookie(&self) -> Cookie<'static> {
        Cookie::build((REFRESH_COOKIE, ""))
            .http_only(true)
            .path("/")
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .max_age(time::Duration::ZERO)
            .build()
    }
}

/// Create auth router
pub fn auth_router(state: Arc<AuthState>) -> Router {
    let protected = Router::new()
        .route("/profile", get(profile))
        .route("/auth/online", get(online_users))
        .route("/invitation", post(send_invitation))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/validate-token", post(validate_token))
        .merge(protected)
        .with_state(state)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AuthError::MalformedInput(rejection.body_text()))
}

/// POST /auth/register - Register with an invitation token
async fn register(
    State(state): State<Arc<AuthState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let req = json_body(payload)?;
    let credential = state
        .service
        .register(&req.email, &req.password, &req.invite_token)
        .await?;
    Ok((StatusCode::CREATED, Json(credential)))
}

/// POST /auth/login - Login with email/password
async fn login(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let req = json_body(payload)?;
    let pair = state.service.login(&req.email, &req.password).await?;

    let jar = jar.add(state.refresh_cookie(pair.refresh_token));
    Ok((
        jar,
        Json(TokenResponse {
            access_token: pair.access_token,
        }),
    ))
}

/// POST /auth/refresh - Rotate the pair using the refresh cookie
async fn refresh(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let Some(token) = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()) else {
        return Err((jar, AuthError::MissingToken));
    };

    match state.service.refresh(&token).await {
        Ok(pair) => {
            let jar = jar.add(state.refresh_cookie(pair.refresh_token));
            Ok((
                jar,
                Json(TokenResponse {
                    access_token: pair.access_token,
                }),
            ))
        }
        Err(e) => {
            log::debug!("Refresh rejected: {}", e);
            Err((jar.add(state.cleared_cookie()), e))
        }
    }
}

/// POST /auth/logout - Drop the refresh cookie
async fn logout(State(state): State<Arc<AuthState>>, jar: CookieJar) -> impl IntoResponse {
    (
        jar.add(state.cleared_cookie()),
        Json(MessageResponse {
            message: "logged out".to_string(),
        }),
    )
}

/// POST /validate-token - Check a bearer access token without side effects
async fn validate_token(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match extract_token(&headers).and_then(|token| state.service.authenticate(token)) {
        Ok(_) => (
            StatusCode::OK,
            Json(ValidateTokenResponse {
                is_valid: true,
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::UNAUTHORIZED,
            Json(ValidateTokenResponse {
                is_valid: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}

/// GET /profile - Current user's credential record
async fn profile(
    State(state): State<Arc<AuthState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Credential>, AuthError> {
    Ok(Json(state.service.profile(&identity.user_id).await?))
}

/// GET /auth/online - Users seen within the presence window
async fn online_users(
    State(state): State<Arc<AuthState>>,
) -> Result<Json<OnlineUsersResponse>, AuthError> {
    let users = state.service.online_users(PRESENCE_TTL).await?;
    Ok(Json(OnlineUsersResponse { users }))
}

/// POST /invitation - Invite a new user by email
async fn send_invitation(
    State(state): State<Arc<AuthState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<InvitationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    identity.require_role(INVITER_ROLES)?;
    let req = json_body(payload)?;
    let invitation = state.service.invite(&req.email).await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}
