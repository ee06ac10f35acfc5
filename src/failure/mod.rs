//! Failure handling subsystem.
//!
//! # Data Flow
//! ```text
//! handler panic ──▶ recovery.rs (catch, capture stack) ──▶ stack.rs (parse, sort)
//!                                    │
//!                                    ▼
//!                             body.rs (ResponseBodyError) ──▶ 500
//!
//! validation errors ──▶ validation.rs (field violations) ──▶ 422
//! ```

pub mod body;
pub mod recovery;
pub mod stack;
pub mod validation;

pub use body::{ResponseBodyError, StackFrame};
pub use recovery::{recover_panics, ErrorRecovery, FailureSupervisor, UnhandledFailure};
pub use validation::{FieldViolation, ValidationErrors};
