//! Security module for StepClaw: tool authorization and audit logging.
//!
//! Provides:
//! - **Gate**: group-based tool visibility and invocation-time re-checks
//! - **Audit logging**: structured records of denials and identity overrides

pub mod audit;
pub mod gate;

pub use audit::{
    AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, DEFAULT_RETENTION, TracingSink,
};
pub use gate::{GateDecision, GroupSource, StaticGroups, ToolGate};
