//! Caller side of the bus: append requests, look up results.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};
use switchyard_core::{Channel, CorrelationId, RequestRecord, Resolution, ResponseRecord, SessionId};
use tracing::debug;

use crate::error::Result;
use crate::paths::ChannelPaths;
use crate::resolver::ResultResolver;
use crate::session::SessionResolver;
use crate::writer::append_record;

/// Receipt for an appended request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub correlation_id: CorrelationId,
    pub session_id: SessionId,
    pub channel: Channel,
    #[serde(skip)]
    pub requests_path: PathBuf,
}

/// A found response together with where it was found.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Located {
    pub session_id: SessionId,
    pub channel: Channel,
    #[serde(flatten)]
    pub resolution: Resolution,
}

/// Submits requests into the current session and reads results back.
///
/// Writers create the session pointer when it is missing; readers never do.
#[derive(Clone, Debug)]
pub struct BusClient {
    sessions: SessionResolver,
}

impl BusClient {
    pub fn new(sessions: SessionResolver) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &SessionResolver {
        &self.sessions
    }

    /// Paths in the current session, creating the session if none exists.
    pub fn current_paths(&self, channel: Channel) -> Result<(SessionId, ChannelPaths)> {
        let session = self.sessions.ensure_session_id()?;
        let paths = self.sessions.channel_paths(&session, channel);
        Ok((session, paths))
    }

    /// The current session, or `None` when no pointer has been written yet.
    pub fn current_session(&self) -> Option<SessionId> {
        self.sessions.read_current_session_id()
    }

    /// Append a request with a fresh correlation id. Returns as soon as the
    /// line is written; whether any executor picks it up is not checked.
    pub fn submit(&self, channel: Channel, kind: &str, args: Map<String, Value>) -> Result<Submission> {
        self.submit_with_id(channel, kind, CorrelationId::new(), args)
    }

    pub fn submit_with_id(
        &self,
        channel: Channel,
        kind: &str,
        correlation_id: CorrelationId,
        args: Map<String, Value>,
    ) -> Result<Submission> {
        let (session_id, paths) = self.current_paths(channel)?;
        paths.ensure()?;
        let request = RequestRecord::new(kind, correlation_id.clone(), args);
        append_record(&paths.requests, &request)?;
        debug!(%channel, %correlation_id, kind, "request submitted");
        Ok(Submission {
            correlation_id,
            session_id,
            channel,
            requests_path: paths.requests,
        })
    }

    /// Ask the channel to cancel `target`. Cancels never get a response of
    /// their own; the target's response carries the outcome.
    pub fn cancel(&self, channel: Channel, target: &CorrelationId) -> Result<Submission> {
        let mut args = Map::new();
        let _ = args.insert("target".into(), Value::String(target.to_string()));
        self.submit(channel, "cancel", args)
    }

    /// Resolve in the current session; pending when there is none.
    pub fn result(&self, channel: Channel, correlation_id: &CorrelationId) -> Result<Resolution> {
        match self.current_session() {
            Some(session) => self.result_in(&session, channel, correlation_id),
            None => Ok(Resolution::Pending),
        }
    }

    pub fn result_in(
        &self,
        session: &SessionId,
        channel: Channel,
        correlation_id: &CorrelationId,
    ) -> Result<Resolution> {
        let paths = self.sessions.channel_paths(session, channel);
        ResultResolver::new(paths.responses).get(correlation_id)
    }

    /// Look the id up on every channel of `session`. Without a session, the
    /// current one is searched first, then older sessions newest-first, so a
    /// unit cancelled by a session switch is still found.
    pub fn find_result(
        &self,
        correlation_id: &CorrelationId,
        session: Option<&SessionId>,
    ) -> Result<Option<Located>> {
        if let Some(session) = session {
            return self.find_in(session, correlation_id);
        }
        let current = self.current_session();
        if let Some(current) = &current {
            if let Some(located) = self.find_in(current, correlation_id)? {
                return Ok(Some(located));
            }
        }
        for older in self.sessions.list_sessions()?.iter().rev() {
            if current.as_ref() == Some(older) {
                continue;
            }
            if let Some(located) = self.find_in(older, correlation_id)? {
                return Ok(Some(located));
            }
        }
        Ok(None)
    }

    fn find_in(&self, session: &SessionId, correlation_id: &CorrelationId) -> Result<Option<Located>> {
        for channel in Channel::ALL {
            let resolution = self.result_in(session, channel, correlation_id)?;
            if !resolution.is_pending() {
                return Ok(Some(Located {
                    session_id: session.clone(),
                    channel,
                    resolution,
                }));
            }
        }
        Ok(None)
    }

    /// Most recent responses in the current session; empty when there is none.
    pub fn results(
        &self,
        channel: Channel,
        limit: usize,
        action_filter: Option<&str>,
    ) -> Result<Vec<ResponseRecord>> {
        match self.current_session() {
            Some(session) => self.results_in(&session, channel, limit, action_filter),
            None => Ok(Vec::new()),
        }
    }

    pub fn results_in(
        &self,
        session: &SessionId,
        channel: Channel,
        limit: usize,
        action_filter: Option<&str>,
    ) -> Result<Vec<ResponseRecord>> {
        let paths = self.sessions.channel_paths(session, channel);
        ResultResolver::new(paths.responses).list(limit, action_filter)
    }
}
