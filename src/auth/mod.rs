/*!
 * # Authentication and Authorization Module
 *
 * Token issuance and profile management belong to the external auth provider;
 * this API only validates bearer JWTs and resolves the caller's profile role
 * for staff-gated endpoints. Guest (unauthenticated) requests are legal on the
 * ordering flow, so handlers that allow walk-up customers use the optional
 * extractor instead of rejecting outright.
 */

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::entities::profile;
use crate::errors::ServiceError;

/// Roles allowed to manage tables, products, and other customers' orders.
pub const STAFF_ROLES: [&str; 3] = ["admin", "owner", "super_user"];

/// Role assigned when an authenticated user has no profile row yet.
pub const DEFAULT_ROLE: &str = "customer";

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // Subject (user ID)
    pub email: Option<String>, // User's email
    pub iat: i64,              // Issued at time
    pub exp: i64,              // Expiration time
    pub iss: String,           // Issuer
    pub aud: String,           // Audience
}

/// Authenticated caller: token subject plus the profile role read from the
/// database (the token itself carries no authorization data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: String,
}

impl AuthUser {
    /// Check if the user holds a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Check if the user may use staff-only endpoints
    pub fn is_staff(&self) -> bool {
        STAFF_ROLES.iter().any(|role| self.role == *role)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, jwt_issuer: String, jwt_audience: String) -> Self {
        Self {
            jwt_secret,
            jwt_issuer,
            jwt_audience,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid subject claim: {0}")]
    InvalidSubject(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::DatabaseError(e) => ServiceError::DatabaseError(e),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

/// Validates bearer tokens and resolves caller profiles
#[derive(Debug, Clone)]
pub struct AuthService {
    config: AuthConfig,
    db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    /// Decode and validate a JWT, returning its claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.clone()]);
        validation.set_issuer(&[self.config.jwt_issuer.clone()]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(data.claims)
    }

    /// Validate a token and resolve the caller's profile role.
    ///
    /// A valid token whose subject has no profile row yet authenticates as a
    /// plain customer; the profile is created lazily by the auth provider.
    pub async fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::InvalidSubject(claims.sub.clone()))?;

        let profile = profile::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?;

        let (role, email) = match profile {
            Some(profile) => (profile.role, Some(profile.email)),
            None => {
                debug!(user_id = %user_id, "No profile row for authenticated user; defaulting role");
                (DEFAULT_ROLE.to_string(), claims.email.clone())
            }
        };

        Ok(AuthUser {
            user_id,
            email,
            role,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

fn auth_service(parts: &Parts) -> Result<Arc<AuthService>, ServiceError> {
    parts
        .extensions
        .get::<Arc<AuthService>>()
        .cloned()
        .ok_or_else(|| ServiceError::InternalError("AuthService missing from extensions".into()))
}

/// Extractor that rejects with 401 when no valid bearer token is presented.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let service = auth_service(parts)?;
        let token = bearer_token(parts)
            .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".to_string()))?;

        let user = service.authenticate(&token).await?;
        Ok(AuthenticatedUser(user))
    }
}

/// Extractor for endpoints that accept both guests and signed-in customers.
///
/// Invalid or absent credentials degrade to a guest; they never fail the
/// request.
#[derive(Debug, Clone)]
pub struct MaybeAuthenticated(pub Option<AuthUser>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthenticated
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Ok(service) = auth_service(parts) else {
            return Ok(MaybeAuthenticated(None));
        };
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeAuthenticated(None));
        };

        match service.authenticate(&token).await {
            Ok(user) => Ok(MaybeAuthenticated(Some(user))),
            Err(err) => {
                debug!("Ignoring invalid bearer token on guest-capable endpoint: {err}");
                Ok(MaybeAuthenticated(None))
            }
        }
    }
}
