use chrono::{DateTime, Utc};

/// A domain event.
///
/// Events are immutable facts about something that already happened to an
/// account, a role or a session.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "auth.user.roles_assigned").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;
}
