//! Authentication service for login and token management

use bcrypt::verify;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::Role;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    tokens: TokenIssuer,
}

/// Login request body
#[derive(Debug, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Issued access token
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Login response: token plus who it was issued to
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: AuthTokens,
    pub user: UserProfile,
}

/// Public view of a user account
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: String,
    pub store_id: Option<Uuid>,
}

/// User info from database
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    full_name: String,
    email: Option<String>,
    password_hash: String,
    role: String,
    store_id: Option<Uuid>,
    is_active: bool,
}

/// Signs and checks HS256 access tokens
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    expiry_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &str, expiry_secs: i64) -> Self {
        Self {
            secret: secret.to_string(),
            expiry_secs,
        }
    }

    pub fn issue(&self, user_id: Uuid, role: Role, store_id: Option<Uuid>) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            store_id: store_id.map(|id| id.to_string()),
            exp: (now + Duration::seconds(self.expiry_secs)).timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok(AuthTokens {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.expiry_secs,
        })
    }

    /// Validate access token and return claims
    pub fn validate(&self, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| AppError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims)
    }
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            tokens: TokenIssuer::new(&config.jwt.secret, config.jwt.access_token_expiry),
        }
    }

    /// Authenticate user with username and password
    pub async fn login(&self, input: LoginInput) -> AppResult<LoginResponse> {
        input.validate()?;

        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, full_name, email, password_hash, role, store_id, is_active
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(input.username.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AppError::AccountDisabled);
        }

        let valid = verify(&input.password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            tracing::warn!(username = %user.username, "Failed login attempt");
            return Err(AppError::InvalidCredentials);
        }

        let role = Role::parse(&user.role)
            .ok_or_else(|| AppError::Internal(format!("Unknown role stored: {}", user.role)))?;

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        let tokens = self.tokens.issue(user.id, role, user.store_id)?;

        tracing::info!(user_id = %user.id, role = %role, "User logged in");

        Ok(LoginResponse {
            tokens,
            user: UserProfile {
                id: user.id,
                username: user.username,
                full_name: user.full_name,
                email: user.email,
                role: user.role,
                store_id: user.store_id,
            },
        })
    }

    /// Load the profile of the authenticated user
    pub async fn profile(&self, user_id: Uuid) -> AppResult<UserProfile> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, username, full_name, email, role, store_id
            FROM users
            WHERE id = $1 AND is_active = true
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
    }
}
