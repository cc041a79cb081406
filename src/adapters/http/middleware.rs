use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::Utc;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppError,
    application::{
        jwt,
        ports::entitlement_cache::{CachedEntitlement, EntitlementCache},
        use_cases::reconciliation::UserDirectoryRepo,
    },
    domain::entities::user::User,
};

/// Authenticated caller, resolved through the read-through entitlement
/// cache. Extract it in any handler that requires a signed-in user.
#[derive(Debug, Clone)]
pub struct AuthedUser(pub User);

impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Auth)?;
        let token = header.strip_prefix("Bearer ").ok_or(AppError::Auth)?;
        let claims = jwt::verify(token, &state.config.jwt_secret)?;

        // Cache hit skips the by-identity directory lookup. Cache failures
        // degrade to the directory, never to a 500.
        let cached = state
            .entitlement_cache
            .get(&claims.sub)
            .await
            .unwrap_or_default();

        let user = match cached {
            Some(entitlement) => state
                .user_repo
                .get_by_id(entitlement.user_id)
                .await?
                .ok_or(AppError::Auth)?,
            None => {
                let user = state
                    .user_repo
                    .get_by_identity(&claims.sub)
                    .await?
                    .ok_or(AppError::Auth)?;

                // TTL bounded by both the token's remaining lifetime and
                // the configured access-token lifetime.
                let token_remaining = (claims.exp - Utc::now().timestamp()).max(0) as u64;
                let ttl = token_remaining
                    .min(state.config.access_token_ttl.whole_seconds().max(0) as u64);
                if ttl > 0 {
                    let entitlement = CachedEntitlement {
                        user_id: user.id,
                        plan: user.plan,
                        plan_expires_at: user.plan_expires_at,
                    };
                    if let Err(e) = state
                        .entitlement_cache
                        .put(&claims.sub, &entitlement, ttl)
                        .await
                    {
                        tracing::warn!(error = %e, "Failed to populate entitlement cache");
                    }
                }
                user
            }
        };

        Ok(AuthedUser(user))
    }
}
