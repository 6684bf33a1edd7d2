use pktracker_auth::{Principal, User};
use pktracker_core::{TokenId, UserId};

/// Authenticated caller for a request.
///
/// Inserted by the auth middleware; every protected handler can rely on it.
#[derive(Debug, Clone)]
pub struct AuthContext {
    principal: Principal,
    token_id: TokenId,
    user: User,
}

impl AuthContext {
    pub fn new(principal: Principal, token_id: TokenId, user: User) -> Self {
        Self {
            principal,
            token_id,
            user,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    /// The user as loaded when the request was authenticated.
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn can(&self, permission: &str) -> bool {
        self.principal.has_permission(permission)
    }
}

/// Marker left in response extensions so the request logger can attribute
/// the request to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub email: String,
}

/// API version resolved for the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersion(pub String);

impl ApiVersion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Best-effort client address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
