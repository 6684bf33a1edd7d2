//! `pktracker-auth` — authentication and authorization boundary.
//!
//! Pure logic only: no HTTP, no storage. Infra resolves principals and
//! persists users; the API layer turns decisions into responses.

pub mod authorize;
pub mod password;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod token;
pub mod user;

pub use authorize::{
    AuthorizationExplanation, AuthzError, RbacRegistry, authorize, explain_authorization,
};
pub use password::{PasswordError, PasswordPolicy, hash_password, verify_password};
pub use permissions::Permission;
pub use policy::{Gate, UserPolicy};
pub use principal::Principal;
pub use roles::Role;
pub use token::{AccessToken, TokenClaims, TokenCodec, TokenError, TokenValidationError, validate_claims};
pub use user::{User, UserCommand, UserEvent};
