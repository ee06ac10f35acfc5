//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Trigger (signal or escalated failure) → Stop accepting → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - In-flight responses drain before exit, so a 500 emitted for a
//!   recovered panic still reaches its client

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
