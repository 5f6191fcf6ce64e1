pub use entity::{
    automation_action, automation_rules, criteria, customers, execution_status,
    scheduled_executions, segment_kind, segments, trigger_type, Id,
};

pub mod automation_rule;
pub mod customer;
pub mod error;
pub mod scheduled_execution;
pub mod segment;
