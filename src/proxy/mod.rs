//! Upstream call subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request + route target
//!     → forwarder.rs (resolve URL, copy headers, cookies, body)
//!     → client.rs (client for the runtime environment)
//!     → identity.rs (mint identity token on managed runtimes)
//!     → upstream service
//! ```

pub mod client;
pub mod forwarder;
pub mod identity;

pub use client::{ClientProvider, RuntimeEnvironment, UpstreamClient};
pub use forwarder::{ForwardError, Forwarder, PathParams};
pub use identity::IdentityError;
