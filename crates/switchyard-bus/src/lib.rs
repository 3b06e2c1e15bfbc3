//! # switchyard-bus
//!
//! The file-backed request/response/event bus.
//!
//! Each session directory holds, per channel, an append-only request log, an
//! append-only response log, an optional event log and an overwritten
//! heartbeat file. Callers append requests; the channel's executor is the
//! only writer of responses and events.

pub mod client;
pub mod codec;
pub mod error;
pub mod heartbeat;
pub mod lines;
pub mod paths;
pub mod resolver;
pub mod retention;
pub mod session;
pub mod tail;
pub mod writer;

pub use client::{BusClient, Located, Submission};
pub use error::{BusError, Result};
pub use heartbeat::{probe, write_heartbeat, ExecutorStatus};
pub use lines::LineSplitter;
pub use paths::ChannelPaths;
pub use resolver::ResultResolver;
pub use session::SessionResolver;
pub use tail::{read_records, JsonlTail};
pub use writer::append_record;
