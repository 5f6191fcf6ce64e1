//! Customer lifecycle automation: segments, automation rules, scheduling and dispatch.
//!
//! Entity types are re-exported from `entity_api` so that consumers of the `domain` crate do
//! not need to depend on `entity` or `entity_api` directly.

pub use entity_api::{
    automation_action, automation_rules, customers, execution_status, scheduled_executions,
    segment_kind, segments, trigger_type, Id,
};

pub mod action;
pub mod automation_rule;
pub mod clock;
pub mod criteria;
pub mod customer;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod execution_log;
pub mod field;
pub mod gateway;
pub mod rule;
pub mod scheduler;
pub mod segment;
pub mod storage;
pub mod trigger;

pub use engine::Engine;
