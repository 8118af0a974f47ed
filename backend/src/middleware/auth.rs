//! Authentication middleware
//!
//! JWT authentication and role-based access control

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Actor, Role};
use crate::services::auth::{Claims, TokenIssuer};
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub store_id: Option<Uuid>,
}

impl AuthUser {
    /// The workflow's view of this user
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role, self.store_id)
    }

    fn from_claims(claims: Claims) -> Result<Self, AppError> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::InvalidToken("invalid user ID in token".to_string()))?;
        let role = Role::parse(&claims.role)
            .ok_or_else(|| AppError::InvalidToken("unknown role in token".to_string()))?;
        let store_id = claims
            .store_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| AppError::InvalidToken("invalid store ID in token".to_string()))?;

        Ok(Self {
            user_id,
            role,
            store_id,
        })
    }
}

/// Authentication middleware that validates `Authorization: Bearer` tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(&request) {
        Some(token) => token,
        None => return AppError::InvalidToken("no token".to_string()).into_response(),
    };

    let issuer = TokenIssuer::new(&state.config.jwt.secret, state.config.jwt.access_token_expiry);
    let auth_user = match issuer.validate(token).and_then(AuthUser::from_claims) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::InvalidToken("authentication required".to_string()))
    }
}

/// Role guard for use in handlers
pub fn require_role(user: &AuthUser, roles: &[Role]) -> Result<(), AppError> {
    if roles.contains(&user.role) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!(
            "Role {} is not allowed to perform this action",
            user.role
        )))
    }
}
