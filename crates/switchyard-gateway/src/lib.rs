//! # switchyard-gateway
//!
//! MCP tool-call gateway over stdio. Forwarding tools append a request to the
//! current session and return its correlation id at once; callers poll
//! `result_get` for the outcome. Artifact reads are confined by
//! [`ArtifactGuard`].

pub mod error;
pub mod guard;
pub mod handlers;
pub mod rpc;
pub mod server;
pub mod tools;

pub use error::{GatewayError, GuardError, Result};
pub use guard::{ArtifactContent, ArtifactGuard};
pub use handlers::{call_tool, GatewayState};
pub use server::{handle_line, run_stdio, serve};
