//! Infrastructure layer: storage, rate limiting, command dispatch, seeding
//! and the audit trail.

pub mod audit;
pub mod command_dispatcher;
pub mod master_data;
pub mod rate_limit;
pub mod repository;
pub mod seed;

pub use audit::{AuditEntry, AuditTrail, AuditWorker, WorkerHandle};
pub use command_dispatcher::{DispatchError, Dispatched, USER_AGGREGATE_TYPE, UserCommandDispatcher};
pub use master_data::{
    MasterDataError, MasterDataService, MasterDataStatistics, NewPermission, NewRole, PermissionChanges,
    PermissionDetails, RoleChanges, RoleDetails,
};
pub use rate_limit::{Clock, ManualClock, RateLimiter, SystemClock, limiter_key};
pub use repository::{
    InMemoryPermissionRepository, InMemoryRoleRepository, InMemoryTokenStore, InMemoryUserRepository,
    PermissionRecord, RepositoryError, RoleRecord, SortField, SortOrder, StatusFilter, UserFilter, UserRepository,
    UserStatistics,
};
pub use seed::{DEMO_USERS, SeedError, SeedReport, seed};
