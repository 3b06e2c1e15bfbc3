//! Single-flight executor loop for one channel.
//!
//! Each tick re-reads the session pointer, reaps a finished unit, then
//! consumes newly appended requests in order. At most one unit of work runs
//! at a time; anything else that needs the slot is answered "executor busy".

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use switchyard_bus::heartbeat::write_heartbeat;
use switchyard_bus::retention::check_log_sizes;
use switchyard_bus::{append_record, read_records, ChannelPaths, JsonlTail, SessionResolver};
use switchyard_core::clock::now_rfc3339;
use switchyard_core::{
    Channel, CorrelationId, EventKind, HeartbeatRecord, RequestRecord, ResponseRecord, SessionId,
    PROTOCOL_VERSION,
};
use switchyard_settings::ExecutorSettings;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::handler::{ChannelHandler, Dispatch, EventSink, UnitContext, UnitOutcome};
use crate::slot::{RunningUnit, Slot};

pub const EXECUTOR_BUSY: &str = "executor busy";
pub const SETUP_FAILED: &str = "setup failed";
pub const CANCELLED: &str = "cancelled";

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub bus_warn_bytes: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&ExecutorSettings::default())
    }
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            bus_warn_bytes: settings.bus_warn_bytes,
        }
    }
}

pub struct Executor<H: ChannelHandler> {
    handler: Arc<H>,
    sessions: SessionResolver,
    config: ExecutorConfig,
    session: SessionId,
    paths: ChannelPaths,
    requests: JsonlTail<RequestRecord>,
    /// Ids already answered in the attached session; applied to the first
    /// read after attaching so a restart does not redo finished work.
    replay_answered: Option<HashSet<CorrelationId>>,
    slot: Slot,
}

impl<H: ChannelHandler> Executor<H> {
    /// Attach to the current session (creating one if needed).
    pub fn new(
        handler: H,
        sessions: SessionResolver,
        config: ExecutorConfig,
    ) -> Result<Self, EngineError> {
        let session = sessions.ensure_session_id()?;
        let paths = sessions.channel_paths(&session, handler.channel());
        let mut executor = Self {
            requests: JsonlTail::new(&paths.requests),
            handler: Arc::new(handler),
            sessions,
            config,
            session: session.clone(),
            paths,
            replay_answered: None,
            slot: Slot::Idle,
        };
        executor.attach(session)?;
        Ok(executor)
    }

    pub fn channel(&self) -> Channel {
        self.handler.channel()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    pub fn paths(&self) -> &ChannelPaths {
        &self.paths
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    /// Run until `shutdown` fires, then cancel and answer any in-flight unit.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), EngineError> {
        info!(
            channel = %self.channel(),
            session_id = %self.session,
            pid = std::process::id(),
            "executor started"
        );

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = heartbeat.tick() => self.beat(),
                _ = poll.tick() => self.tick().await,
            }
        }

        self.stop().await;
        info!(channel = %self.channel(), "executor stopped");
        Ok(())
    }

    /// One poll cycle.
    pub async fn tick(&mut self) {
        let attached = self.refresh_session().await;
        self.reap().await;
        if attached {
            self.poll_requests();
        }
    }

    /// Cancel the in-flight unit and write its response.
    pub async fn stop(&mut self) {
        if let Some(unit) = self.slot.take() {
            unit.cancel.cancel();
            self.finish(unit).await;
        }
        self.beat();
    }

    /// Point the executor at `session`. Nothing changes unless the session's
    /// files can be created and read, so a failed attach is retried on the
    /// next tick.
    fn attach(&mut self, session: SessionId) -> Result<(), EngineError> {
        let paths = self.sessions.channel_paths(&session, self.channel());
        paths.ensure()?;
        let answered = read_records::<ResponseRecord>(&paths.responses)?
            .into_iter()
            .map(|r| r.correlation_id)
            .collect();

        self.requests.retarget(&paths.requests);
        self.replay_answered = Some(answered);
        self.paths = paths;
        self.session = session;
        let _ = check_log_sizes(&self.paths, self.config.bus_warn_bytes);
        self.beat();
        Ok(())
    }

    /// Follow the session pointer. Returns false while the executor is not
    /// attached to the current session; requests are not read until it is.
    async fn refresh_session(&mut self) -> bool {
        let current = match self.sessions.read_current_session_id() {
            Some(id) => id,
            None => match self.sessions.ensure_session_id() {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, "session pointer unavailable");
                    return true;
                }
            },
        };
        if current == self.session {
            return true;
        }

        info!(
            channel = %self.channel(),
            from = %self.session,
            to = %current,
            "session switched"
        );
        if let Some(unit) = self.slot.take() {
            unit.cancel.cancel();
            self.finish(unit).await;
        }
        match self.attach(current.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, session_id = %current, "failed to attach session, will retry");
                false
            }
        }
    }

    async fn reap(&mut self) {
        if !self.slot.is_finished() {
            return;
        }
        if let Some(unit) = self.slot.take() {
            self.finish(unit).await;
        }
    }

    fn poll_requests(&mut self) {
        let requests = match self.requests.poll() {
            Ok(requests) => requests,
            Err(e) => {
                warn!(error = %e, "request poll failed");
                return;
            }
        };
        let answered = self.replay_answered.take();
        for request in requests {
            if answered
                .as_ref()
                .is_some_and(|ids| ids.contains(&request.correlation_id))
            {
                debug!(correlation_id = %request.correlation_id, "skipping answered request");
                continue;
            }
            self.dispatch(request);
        }
    }

    fn dispatch(&mut self, request: RequestRecord) {
        debug!(
            channel = %self.channel(),
            correlation_id = %request.correlation_id,
            kind = %request.kind,
            "request"
        );
        match self.handler.parse(&request) {
            Dispatch::Cancel { target } => {
                if self.slot.cancel_if(&target) {
                    info!(correlation_id = %target, "cancel requested");
                } else {
                    debug!(correlation_id = %target, "cancel target not running");
                }
            }
            Dispatch::Status => {
                let response = self.status_response(&request);
                self.respond(&request, response);
            }
            Dispatch::Immediate(response) => self.respond(&request, response),
            Dispatch::Unit(unit) => {
                if self.slot.is_running() {
                    let response = ResponseRecord::immediate(
                        self.channel(),
                        request.correlation_id.clone(),
                        false,
                        EXECUTOR_BUSY,
                        self.slot
                            .correlation_id()
                            .map(|cid| format!("running {cid}"))
                            .unwrap_or_default(),
                    );
                    self.respond(&request, response);
                    return;
                }
                match self.handler.prepare(unit) {
                    Ok(prepared) => self.start(request, prepared),
                    Err(e) => {
                        warn!(
                            correlation_id = %request.correlation_id,
                            error = %e,
                            kind = e.error_kind(),
                            "unit setup failed"
                        );
                        let mut response = ResponseRecord::immediate(
                            self.channel(),
                            request.correlation_id.clone(),
                            false,
                            SETUP_FAILED,
                            e.to_string(),
                        );
                        response.error = Some(e.to_string());
                        self.respond(&request, response);
                    }
                }
            }
        }
    }

    fn start(&mut self, request: RequestRecord, prepared: H::Prepared) {
        let correlation_id = request.correlation_id;
        let events = EventSink::new(self.paths.events.clone(), correlation_id.clone());
        events.emit(EventKind::Info, format!("started {}", request.kind), None);

        let cancel = CancellationToken::new();
        let ctx = UnitContext {
            correlation_id: correlation_id.clone(),
            session_dir: self.paths.session_dir.clone(),
            cancel: cancel.clone(),
            events,
        };
        let handler = Arc::clone(&self.handler);
        let task = tokio::spawn(async move { handler.run(prepared, ctx).await });

        info!(channel = %self.channel(), %correlation_id, action = %request.kind, "unit started");
        self.slot = Slot::Running(RunningUnit {
            correlation_id,
            action: request.kind,
            cancel,
            task,
            started_at: now_rfc3339(),
            responses_path: self.paths.responses.clone(),
        });
        self.beat();
    }

    async fn finish(&mut self, unit: RunningUnit) {
        let mut outcome = match unit.task.await {
            Ok(outcome) => outcome,
            Err(e) => UnitOutcome::failed("unit failed", e.to_string()),
        };
        // A unit that completed before noticing the token keeps its success.
        let cancelled = unit.cancel.is_cancelled() && !outcome.ok;
        if cancelled {
            outcome.ok = false;
            outcome.summary = CANCELLED.into();
            outcome.error = Some(CANCELLED.into());
        }

        let response = ResponseRecord {
            version: PROTOCOL_VERSION,
            kind: self.channel().result_type(),
            correlation_id: unit.correlation_id,
            ok: outcome.ok,
            action: Some(unit.action),
            summary: Some(outcome.summary),
            detail: outcome.detail,
            artifacts: outcome.artifacts,
            started_at: unit.started_at,
            ended_at: now_rfc3339(),
            exit_code: outcome.exit_code,
            error: outcome.error,
            file_changes: outcome.file_changes,
        };
        if cancelled {
            info!(correlation_id = %response.correlation_id, "unit cancelled");
        } else {
            info!(
                correlation_id = %response.correlation_id,
                ok = response.ok,
                exit_code = ?response.exit_code,
                "unit finished"
            );
        }
        if let Err(e) = append_record(&unit.responses_path, &response) {
            warn!(error = %e, correlation_id = %response.correlation_id, "response append failed");
        }
        self.beat();
    }

    fn respond(&self, request: &RequestRecord, mut response: ResponseRecord) {
        if response.action.is_none() {
            response.action = Some(request.kind.clone());
        }
        if let Err(e) = append_record(&self.paths.responses, &response) {
            warn!(error = %e, correlation_id = %response.correlation_id, "response append failed");
        }
    }

    fn status_response(&self, request: &RequestRecord) -> ResponseRecord {
        let state = self.slot.state();
        let detail = json!({
            "channel": self.channel(),
            "sessionId": self.session,
            "state": state,
            "correlationId": self.slot.correlation_id(),
            "pid": std::process::id(),
        });
        let summary = match state {
            switchyard_core::ExecutorState::Idle => "idle",
            switchyard_core::ExecutorState::Running => "running",
        };
        ResponseRecord::immediate(
            self.channel(),
            request.correlation_id.clone(),
            true,
            summary,
            detail.to_string(),
        )
    }

    fn beat(&self) {
        let record = HeartbeatRecord {
            version: PROTOCOL_VERSION,
            pid: std::process::id(),
            session_id: self.session.clone(),
            channel: self.channel(),
            state: self.slot.state(),
            correlation_id: self.slot.correlation_id().cloned(),
            updated_at: now_rfc3339(),
            requests_path: self.paths.requests.display().to_string(),
            responses_path: self.paths.responses.display().to_string(),
            events_path: self
                .paths
                .events
                .as_ref()
                .map(|p| p.display().to_string()),
        };
        let _ = write_heartbeat(&self.paths.heartbeat, &record);
    }
}
