//! User command pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the stored user (trashed included)
//!   ↓
//! 2. Handle command (pure decision logic, produces events)
//!   ↓
//! 3. Apply events and persist (optimistic version check)
//!   ↓
//! 4. Publish one envelope per event to the bus
//! ```
//!
//! Nothing is published unless the repository write succeeded.

use serde_json::Value as JsonValue;
use thiserror::Error;

use pktracker_auth::{User, UserCommand, UserEvent};
use pktracker_core::{Aggregate, AggregateRoot, DomainError, UserId};
use pktracker_events::{Event, EventBus, EventEnvelope};

use crate::repository::{RepositoryError, UserRepository};

/// Aggregate type stamped on every published envelope.
pub const USER_AGGREGATE_TYPE: &str = "auth.user";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{0}")]
    InvariantViolation(String),

    #[error("user not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("repository error: {0}")]
    Repository(RepositoryError),

    #[error("failed to serialize event: {0}")]
    Serialize(String),

    /// Publication failed after a successful write.
    #[error("failed to publish event: {0}")]
    Publish(String),
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation { field, message } => DispatchError::Validation { field, message },
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation {
                field: "id",
                message: msg,
            },
            DomainError::NotFound(_) => DispatchError::NotFound,
        }
    }
}

impl From<RepositoryError> for DispatchError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(msg) => DispatchError::Conflict(msg),
            RepositoryError::NotFound => DispatchError::NotFound,
            other => DispatchError::Repository(other),
        }
    }
}

/// Result of a dispatched command: the user after the command and the events
/// it produced (empty when the command changed nothing).
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub user: User,
    pub events: Vec<UserEvent>,
}

impl Dispatched {
    pub fn changed(&self) -> bool {
        !self.events.is_empty()
    }
}

#[derive(Debug)]
pub struct UserCommandDispatcher<R, B> {
    users: R,
    bus: B,
}

impl<R, B> UserCommandDispatcher<R, B> {
    pub fn new(users: R, bus: B) -> Self {
        Self { users, bus }
    }

    pub fn users(&self) -> &R {
        &self.users
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<R, B> UserCommandDispatcher<R, B>
where
    R: UserRepository,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn dispatch(&self, user_id: UserId, command: UserCommand) -> Result<Dispatched, DispatchError> {
        // 1) Load
        let mut user = match &command {
            UserCommand::Create(_) => {
                if self.users.get_with_trashed(user_id)?.is_some() {
                    return Err(DispatchError::Conflict(format!("user {user_id} already exists")));
                }
                User::empty(user_id)
            }
            _ => self.users.get_with_trashed(user_id)?.ok_or(DispatchError::NotFound)?,
        };
        let expected_version = user.version();

        // 2) Decide
        let events = user.handle(&command)?;
        if events.is_empty() {
            return Ok(Dispatched { user, events });
        }

        // 3) Evolve + persist
        for ev in &events {
            user.apply(ev);
        }

        let purged = events.iter().any(|e| matches!(e, UserEvent::Purged(_)));
        if purged {
            self.users.remove(user_id)?;
        } else if expected_version == 0 {
            self.users.insert(user.clone())?;
        } else {
            self.users.save(user.clone(), expected_version)?;
        }

        // 4) Publish
        let mut sequence = expected_version;
        for ev in &events {
            sequence += 1;
            let payload = serde_json::to_value(ev).map_err(|e| DispatchError::Serialize(e.to_string()))?;
            let envelope = EventEnvelope::new(
                ev.event_type(),
                *user_id.as_uuid(),
                USER_AGGREGATE_TYPE,
                sequence,
                ev.occurred_at(),
                payload,
            );
            self.bus
                .publish(envelope)
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        tracing::debug!(user_id = %user_id, events = events.len(), "user command dispatched");

        Ok(Dispatched { user, events })
    }
}
