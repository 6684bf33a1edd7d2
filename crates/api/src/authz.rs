//! API-side authorization guards.
//!
//! Handlers call these before touching any store, so a refused request has
//! no side effects.

use pktracker_auth::{Permission, authorize};

use crate::app::errors::ApiError;
use crate::context::AuthContext;

/// Require a single permission of the caller.
pub fn require_permission(auth: &AuthContext, permission: &str) -> Result<(), ApiError> {
    if let Err(e) = authorize(auth.principal(), &Permission::new(permission.to_string())) {
        tracing::warn!(
            user_id = %auth.user_id(),
            permission,
            error = %e,
            "authorization denied"
        );
        return Err(e.into());
    }
    Ok(())
}

/// Turn a policy or gate decision into a 403.
pub fn require_policy(allowed: bool) -> Result<(), ApiError> {
    if allowed {
        Ok(())
    } else {
        Err(ApiError::Forbidden("This action is unauthorized.".to_string()))
    }
}
