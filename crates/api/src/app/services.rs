//! Service wiring: repositories, dispatcher, master data, tokens, limiter
//! and the audit trail, shared by every handler.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use pktracker_auth::{AccessToken, PasswordPolicy, Principal, TokenClaims, TokenCodec, User, UserCommand};
use pktracker_core::UserId;
use pktracker_events::{EventEnvelope, InMemoryEventBus};
use pktracker_infra::{
    AuditTrail, AuditWorker, Dispatched, InMemoryPermissionRepository, InMemoryRoleRepository, InMemoryTokenStore,
    InMemoryUserRepository, MasterDataService, RateLimiter, SeedError, UserCommandDispatcher, UserRepository,
    WorkerHandle, seed,
};

use crate::app::dto::{self, UserResource};
use crate::app::errors::ApiError;
use crate::config::AppConfig;
use crate::context::AuthContext;

pub type UserStore = Arc<InMemoryUserRepository>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = UserCommandDispatcher<UserStore, Bus>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("seeding failed: {0}")]
    Seed(#[from] SeedError),

    #[error("failed to start audit worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// A freshly issued bearer token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub record: AccessToken,
}

#[derive(Debug)]
pub struct AppServices {
    pub config: AppConfig,
    pub dispatcher: Dispatcher,
    pub master: MasterDataService,
    pub tokens: InMemoryTokenStore,
    pub codec: TokenCodec,
    pub limiter: RateLimiter,
    pub audit: AuditTrail,
    pub password_policy: PasswordPolicy,
    audit_worker: Mutex<Option<WorkerHandle>>,
}

impl AppServices {
    pub fn build(config: AppConfig) -> Result<Self, StartupError> {
        let users: UserStore = Arc::new(InMemoryUserRepository::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());

        let audit = AuditTrail::new();
        let audit_worker = AuditWorker::spawn(&bus, audit.clone())?;

        let master = MasterDataService::new(
            Arc::new(InMemoryRoleRepository::new()),
            Arc::new(InMemoryPermissionRepository::new()),
            users.clone(),
        );
        let dispatcher = UserCommandDispatcher::new(users, bus);

        let report = seed(&master, &dispatcher, config.seed_demo_users)?;
        tracing::info!(
            permissions = report.permissions_created,
            roles = report.roles_created,
            users = report.users_created,
            "in-memory stores seeded"
        );

        Ok(Self {
            codec: TokenCodec::new(config.auth.jwt_secret.as_bytes()),
            config,
            dispatcher,
            master,
            tokens: InMemoryTokenStore::new(),
            limiter: RateLimiter::new(),
            audit,
            password_policy: PasswordPolicy::default(),
            audit_worker: Mutex::new(Some(audit_worker)),
        })
    }

    pub fn users(&self) -> &InMemoryUserRepository {
        self.dispatcher.users()
    }

    pub fn dispatch(&self, user_id: UserId, command: UserCommand) -> Result<Dispatched, ApiError> {
        Ok(self.dispatcher.dispatch(user_id, command)?)
    }

    /// Live (not trashed) user or 404.
    pub fn live_user(&self, id: UserId) -> Result<User, ApiError> {
        self.users().get(id)?.ok_or_else(|| ApiError::not_found("User"))
    }

    pub fn principal_for(&self, user: &User) -> Result<Principal, ApiError> {
        Ok(self.master.principal_for(user)?)
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::days(self.config.auth.token_lifetime_days)
    }

    /// Store a new token for `user` and sign it.
    pub fn issue_token(&self, user: &User, name: &str, now: DateTime<Utc>) -> Result<IssuedToken, ApiError> {
        let record = self.tokens.issue(user.id, name, now, self.token_lifetime())?;
        let access_token = self.codec.encode(&TokenClaims::for_token(&record))?;
        Ok(IssuedToken { access_token, record })
    }

    /// Resolve a bearer token to the calling user.
    ///
    /// The JWT must verify, its `jti` must name a usable stored token issued
    /// to the same subject, and the subject must be a live account. Inactive
    /// accounts are rejected with [`ApiError::AccountDisabled`].
    pub fn authenticate(&self, bearer: &str, now: DateTime<Utc>) -> Result<AuthContext, ApiError> {
        let claims = self.codec.verify(bearer, now)?;

        let token = self.tokens.get(claims.jti)?.ok_or_else(ApiError::unauthenticated)?;
        if token.user_id != claims.sub || !token.is_usable(now) {
            return Err(ApiError::unauthenticated());
        }

        let user = self.users().get(claims.sub)?.ok_or_else(ApiError::unauthenticated)?;
        if !user.is_active {
            return Err(ApiError::AccountDisabled);
        }

        let principal = self.principal_for(&user)?;
        self.tokens.touch(token.id, now)?;
        Ok(AuthContext::new(principal, token.id, user))
    }

    /// Render `user` for `viewer`.
    pub fn user_resource(&self, user: &User, viewer: &AuthContext) -> Result<UserResource, ApiError> {
        let roles = self.master.role_names_of(user)?;
        let permissions = if viewer.can(pktracker_auth::permissions::VIEW_PERMISSIONS) {
            Some(self.principal_for(user)?.permission_names())
        } else {
            None
        };
        Ok(dto::user_resource(user, roles, permissions, viewer, Utc::now()))
    }

    /// Drop dead tokens and expired limiter windows.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<(), ApiError> {
        let tokens = self.tokens.sweep(now)?;
        let windows = self.limiter.sweep();
        if tokens + windows > 0 {
            tracing::debug!(tokens, windows, "expired state swept");
        }
        Ok(())
    }

    /// Stop the audit worker. Later calls are no-ops.
    pub fn shutdown(&self) {
        let handle = match self.audit_worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.shutdown();
        }
    }
}
