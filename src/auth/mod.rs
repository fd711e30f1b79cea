use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{error::AppError, models::Role, policy};

pub mod password;
pub mod token;

pub use token::{Claims, IssuedToken, TokenService};

/// AuthUser
///
/// The resolved identity of an authenticated request. The authentication stage
/// produces it from the token's claims and stores it in the request extensions;
/// the authorization stage and the handlers receive it as an ordinary extractor
/// argument, never through an untyped context lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    /// The id carried by the token.
    pub id: Uuid,
    /// The role carried by the token. Used for Role-Based Access Control (RBAC).
    pub role: Role,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            id: claims.user_id,
            role: claims.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Reuse: if the authentication middleware already resolved the identity, it is
///    taken from the request extensions.
/// 2. Token Extraction: `Authorization: Bearer <token>`.
/// 3. Token Validation: signature and expiry via the `TokenService`.
///
/// The token is stateless, so no database lookup happens here.
///
/// Rejection: `AppError::Unauthenticated` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(*user);
        }

        let token = bearer_token(&parts.headers)?;
        let tokens = TokenService::from_ref(state);
        let claims = tokens.validate_token(token)?;

        Ok(AuthUser::from(claims))
    }
}

/// Pulls the raw token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthenticated("missing Authorization header".into()))?
        .to_str()
        .map_err(|_| AppError::Unauthenticated("non-ascii Authorization header".into()))?;

    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthenticated("Authorization header is not a Bearer token".into()))
}

/// authenticate
///
/// Authentication stage of the pipeline. Extracting `AuthUser` validates the token
/// (the extractor short-circuits with 401 on failure); the resolved identity is then
/// stored in the request so later stages reuse it.
pub async fn authenticate(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    tracing::debug!(user_id = %auth_user.id, role = %auth_user.role, "authenticated");
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// authorize
///
/// Authorization stage of the pipeline. Classifies the request path and asks the
/// policy whether the authenticated identity may proceed.
pub async fn authorize(
    auth_user: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let access = policy::access_for(request.uri().path());
    policy::authorize(&auth_user, access)?;
    Ok(next.run(request).await)
}
