use uuid::Uuid;

// Core entities
pub mod automation_rules;
pub mod customers;
pub mod scheduled_executions;
pub mod segments;

// Column enums
pub mod execution_status;
pub mod segment_kind;
pub mod trigger_type;

// JSON column payloads
pub mod automation_action;
pub mod criteria;

/// A type alias that represents any Entity's internal id field data type.
/// Aliased so that it's easy to change the underlying type if necessary.
pub type Id = Uuid;
