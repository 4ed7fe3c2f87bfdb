//! Command abstractions.

use uuid::Uuid;

/// Trait that all player commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Stable name of the command, used as a log field.
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// The story the command targets; `None` for commands that create one.
    fn story_id(&self) -> Option<Uuid>;
}
