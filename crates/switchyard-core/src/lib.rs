//! # switchyard-core
//!
//! Shared vocabulary for the switchyard executor protocol:
//!
//! - **Branded IDs**: `SessionId`, `CorrelationId`
//! - **Channels**: the closed set of bus channels
//! - **Records**: request, response, event and heartbeat wire records
//! - **Credentials**: secret-wrapping types handed to worker processes

pub mod channel;
pub mod clock;
pub mod errors;
pub mod ids;
pub mod records;
pub mod security;

pub use channel::{Channel, UnknownChannel};
pub use errors::RecordError;
pub use ids::{CorrelationId, SessionId};
pub use records::{
    BusRecord, EventKind, EventRecord, ExecutorState, HeartbeatRecord, RequestRecord,
    Resolution, ResponseRecord, EVENT_TYPE, PROTOCOL_VERSION,
};
