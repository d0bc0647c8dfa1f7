//! PlanStore - persistence for generated marketing plans
//!
//! One SQLite database holds the plan records (questionnaire in, artifacts
//! out, forward-only status) and the usage log that prices every model call.
//! The [`Store`] API is synchronous; the planforge service wraps it in a
//! single-owner actor task.
//!
//! # Modules
//!
//! - [`plan`] - Plan record, status lifecycle, partial updates
//! - [`usage`] - Usage-log entries
//! - [`store`] - SQLite operations
//! - [`error`] - Error types

pub mod error;
pub mod plan;
pub mod store;
pub mod usage;

// Re-export commonly used types
pub use error::{Result, StoreError};
pub use plan::{Contact, Plan, PlanPatch, PlanStatus};
pub use store::Store;
pub use usage::UsageLogEntry;
