//! End-to-end executor tests against real bus files and fake worker scripts.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use switchyard_bus::{read_records, BusClient, ChannelPaths, SessionResolver};
use switchyard_core::{Channel, CorrelationId, EventKind, EventRecord, ExecutorState, ResponseRecord};
use switchyard_engine::credentials::CredentialStore;
use switchyard_engine::{
    ChannelHandler, CodexRuntime, Executor, ExecutorConfig, OpenCodeRuntime, SystemHandler,
    WorkerHandler,
};
use switchyard_settings::{SystemSettings, WorkerProfile};

const DEADLINE: Duration = Duration::from_secs(10);

fn fake_worker(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn profile(bin: &Path) -> WorkerProfile {
    WorkerProfile {
        bin: bin.display().to_string(),
        token_env: Some("SWITCHYARD_TEST_UNSET_TOKEN".into()),
        ..WorkerProfile::default()
    }
}

fn codex_executor(state: &Path, bin: &Path) -> Executor<WorkerHandler<CodexRuntime>> {
    let handler = WorkerHandler::new(
        CodexRuntime::new(profile(bin)),
        profile(bin),
        CredentialStore::in_state_dir(state),
        None,
        state.to_path_buf(),
    );
    Executor::new(handler, SessionResolver::new(state), ExecutorConfig::default()).unwrap()
}

fn system_executor(state: &Path) -> Executor<SystemHandler> {
    let handler = SystemHandler::new(SystemSettings::default(), None, state.to_path_buf());
    Executor::new(handler, SessionResolver::new(state), ExecutorConfig::default()).unwrap()
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn submit(client: &BusClient, channel: Channel, kind: &str, cid: &str, extra: Value) {
    let _ = client
        .submit_with_id(channel, kind, CorrelationId::from_raw(cid), args(extra))
        .unwrap();
}

fn responses(paths: &ChannelPaths) -> Vec<ResponseRecord> {
    read_records(&paths.responses).unwrap()
}

fn response_for(paths: &ChannelPaths, cid: &str) -> Option<ResponseRecord> {
    responses(paths)
        .into_iter()
        .find(|r| r.correlation_id.as_str() == cid)
}

async fn tick_until<H, F>(executor: &mut Executor<H>, mut done: F)
where
    H: ChannelHandler,
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + DEADLINE;
    loop {
        executor.tick().await;
        if done() {
            return;
        }
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn system_ping_and_exec_each_get_one_response() {
    let state = tempfile::tempdir().unwrap();
    let mut executor = system_executor(state.path());
    let client = BusClient::new(SessionResolver::new(state.path()));
    let paths = executor.paths().clone();

    submit(&client, Channel::System, "ping", "p1", json!({}));
    submit(&client, Channel::System, "exec", "e1", json!({"command": "echo hi; exit 2"}));
    tick_until(&mut executor, || response_for(&paths, "e1").is_some()).await;

    let all = responses(&paths);
    assert_eq!(all.len(), 2);

    let pong = response_for(&paths, "p1").unwrap();
    assert!(pong.ok);
    assert_eq!(pong.summary.as_deref(), Some("pong"));
    assert_eq!(pong.kind, "system.result");
    assert_eq!(pong.action.as_deref(), Some("ping"));

    let exec = response_for(&paths, "e1").unwrap();
    assert!(!exec.ok);
    assert_eq!(exec.exit_code, Some(2));
    assert!(exec.detail.contains("hi"));
    assert!(exec.started_at <= exec.ended_at);
}

#[tokio::test]
async fn unknown_and_invalid_requests_are_answered() {
    let state = tempfile::tempdir().unwrap();
    let mut executor = system_executor(state.path());
    let client = BusClient::new(SessionResolver::new(state.path()));
    let paths = executor.paths().clone();

    submit(&client, Channel::System, "launch", "u1", json!({}));
    submit(&client, Channel::System, "exec", "i1", json!({}));
    executor.tick().await;

    let unknown = response_for(&paths, "u1").unwrap();
    assert!(!unknown.ok);
    assert_eq!(unknown.summary.as_deref(), Some("unknown action"));

    let invalid = response_for(&paths, "i1").unwrap();
    assert_eq!(invalid.summary.as_deref(), Some("invalid request"));
    assert!(invalid.detail.contains("command"));
}

#[tokio::test]
async fn turn_emits_started_event_then_response() {
    let state = tempfile::tempdir().unwrap();
    let bin = fake_worker(
        state.path(),
        "codex",
        r#"echo '{"type":"thread.started","thread_id":"t1"}'
echo 'warming up'
echo '{"type":"item.completed","item":{"type":"agent_message","text":"here are the files"}}'
echo '{"type":"turn.completed"}'"#,
    );
    let mut executor = codex_executor(state.path(), &bin);
    let client = BusClient::new(SessionResolver::new(state.path()));
    let paths = executor.paths().clone();

    submit(&client, Channel::Codex, "turn", "cid1", json!({"prompt": "list files"}));
    tick_until(&mut executor, || response_for(&paths, "cid1").is_some()).await;

    let events: Vec<EventRecord> = read_records(paths.events.as_ref().unwrap()).unwrap();
    assert_eq!(events[0].kind, EventKind::Info);
    assert!(events[0].message.contains("started"));
    assert!(events.iter().all(|e| e.correlation_id.as_str() == "cid1"));
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::Delta && e.message == "here are the files"));

    let response = response_for(&paths, "cid1").unwrap();
    assert!(response.ok, "{response:?}");
    assert_eq!(response.kind, "codex.result");
    assert_eq!(response.file_changes, Some(vec![]));
    assert_eq!(response.exit_code, Some(0));
    let last = response.artifacts["lastMessage"].as_str().unwrap();
    assert_eq!(std::fs::read_to_string(last).unwrap(), "here are the files");
}

#[tokio::test]
async fn busy_rejection_and_cancel() {
    let state = tempfile::tempdir().unwrap();
    let bin = fake_worker(state.path(), "codex", "sleep 30");
    let mut executor = codex_executor(state.path(), &bin);
    let client = BusClient::new(SessionResolver::new(state.path()));
    let paths = executor.paths().clone();

    submit(&client, Channel::Codex, "turn", "a", json!({"prompt": "long job"}));
    executor.tick().await;
    assert_eq!(executor.slot().state(), ExecutorState::Running);

    submit(&client, Channel::Codex, "turn", "b", json!({"prompt": "second"}));
    submit(&client, Channel::Codex, "cancel", "c-miss", json!({"target": "nope"}));
    submit(&client, Channel::Codex, "status", "s1", json!({}));
    executor.tick().await;

    let busy = response_for(&paths, "b").unwrap();
    assert!(!busy.ok);
    assert_eq!(busy.summary.as_deref(), Some("executor busy"));
    assert_eq!(response_for(&paths, "s1").unwrap().summary.as_deref(), Some("running"));
    assert!(response_for(&paths, "c-miss").is_none());
    assert!(response_for(&paths, "a").is_none());
    assert_eq!(executor.slot().state(), ExecutorState::Running);

    submit(&client, Channel::Codex, "cancel", "c-hit", json!({"target": "a"}));
    tick_until(&mut executor, || response_for(&paths, "a").is_some()).await;

    let cancelled = response_for(&paths, "a").unwrap();
    assert!(!cancelled.ok);
    assert_eq!(cancelled.error.as_deref(), Some("cancelled"));
    assert!(response_for(&paths, "c-hit").is_none());
    assert_eq!(executor.slot().state(), ExecutorState::Idle);

    let answered_a = responses(&paths)
        .iter()
        .filter(|r| r.correlation_id.as_str() == "a")
        .count();
    assert_eq!(answered_a, 1);
}

#[tokio::test]
async fn think_phase_plans_then_runs_with_plan() {
    let state = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let bin = fake_worker(
        state.path(),
        "codex",
        r#"for last; do :; done
case "$*" in
  *read-only*)
    echo '{"type":"item.completed","item":{"type":"reasoning","text":"inspecting"}}'
    echo '{"type":"item.completed","item":{"type":"agent_message","text":"1. edit a.rs"}}'
    ;;
  *)
    printf '%s' "$last" > prompt.txt
    echo '{"type":"item.completed","item":{"type":"file_change","changes":[{"path":"a.rs","kind":"update"},{"path":"a.rs","kind":"update"}]}}'
    echo '{"type":"item.completed","item":{"type":"agent_message","text":"edited"}}'
    ;;
esac"#,
    );
    let mut executor = codex_executor(state.path(), &bin);
    let client = BusClient::new(SessionResolver::new(state.path()));
    let paths = executor.paths().clone();

    submit(
        &client,
        Channel::Codex,
        "turn",
        "t1",
        json!({"prompt": "fix a.rs", "think": true, "cwd": work.path()}),
    );
    tick_until(&mut executor, || response_for(&paths, "t1").is_some()).await;

    let response = response_for(&paths, "t1").unwrap();
    assert!(response.ok, "{response:?}");
    assert_eq!(response.file_changes, Some(vec!["a.rs".to_string()]));

    let plan = response.artifacts["plan"].as_str().unwrap();
    assert_eq!(std::fs::read_to_string(plan).unwrap(), "1. edit a.rs");
    let prompt = std::fs::read_to_string(work.path().join("prompt.txt")).unwrap();
    assert!(prompt.starts_with("fix a.rs"));
    assert!(prompt.contains("1. edit a.rs"));

    let events: Vec<EventRecord> = read_records(paths.events.as_ref().unwrap()).unwrap();
    let think: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Think).collect();
    assert!(think.iter().any(|e| e.message == "1. edit a.rs"));
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::Delta && e.message == "edited"));
}

#[tokio::test]
async fn failed_think_phase_skips_run() {
    let state = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let bin = fake_worker(
        state.path(),
        "opencode",
        r#"case "$*" in
  *"--agent plan"*) echo 'no plan for you' >&2; exit 4 ;;
  *) touch ran.txt ;;
esac"#,
    );
    let handler = WorkerHandler::new(
        OpenCodeRuntime::new(profile(&bin)),
        profile(&bin),
        CredentialStore::in_state_dir(state.path()),
        None,
        state.path().to_path_buf(),
    );
    let mut executor =
        Executor::new(handler, SessionResolver::new(state.path()), ExecutorConfig::default())
            .unwrap();
    let client = BusClient::new(SessionResolver::new(state.path()));
    let paths = executor.paths().clone();

    submit(
        &client,
        Channel::OpenCode,
        "turn",
        "t2",
        json!({"prompt": "do it", "think": true, "cwd": work.path()}),
    );
    tick_until(&mut executor, || response_for(&paths, "t2").is_some()).await;

    let response = response_for(&paths, "t2").unwrap();
    assert!(!response.ok);
    assert_eq!(response.summary.as_deref(), Some("think phase failed"));
    let error = response.error.unwrap();
    assert!(error.starts_with("planning failed:"), "{error}");
    assert!(error.contains("no plan for you"));
    assert!(!work.path().join("ran.txt").exists());
}

#[tokio::test]
async fn setup_failure_leaves_slot_idle() {
    let state = tempfile::tempdir().unwrap();
    let bin = fake_worker(
        state.path(),
        "codex",
        r#"echo '{"type":"item.completed","item":{"type":"agent_message","text":"ok"}}'"#,
    );
    let mut executor = codex_executor(state.path(), &bin);
    let client = BusClient::new(SessionResolver::new(state.path()));
    let paths = executor.paths().clone();

    submit(&client, Channel::Codex, "turn", "bad", json!({"prompt": "x", "cwd": "/definitely/not/here"}));
    submit(&client, Channel::Codex, "turn", "good", json!({"prompt": "x"}));
    tick_until(&mut executor, || response_for(&paths, "good").is_some()).await;

    let bad = response_for(&paths, "bad").unwrap();
    assert!(!bad.ok);
    assert_eq!(bad.summary.as_deref(), Some("setup failed"));
    assert!(response_for(&paths, "good").unwrap().ok);
}

#[tokio::test]
async fn missing_worker_binary_fails_the_turn() {
    let state = tempfile::tempdir().unwrap();
    let mut executor = codex_executor(state.path(), Path::new("/nonexistent/codex"));
    let client = BusClient::new(SessionResolver::new(state.path()));
    let paths = executor.paths().clone();

    submit(&client, Channel::Codex, "turn", "s1", json!({"prompt": "x"}));
    tick_until(&mut executor, || response_for(&paths, "s1").is_some()).await;

    let response = response_for(&paths, "s1").unwrap();
    assert!(!response.ok);
    assert_eq!(response.summary.as_deref(), Some("worker spawn failed"));
    assert_eq!(executor.slot().state(), ExecutorState::Idle);
}

#[tokio::test]
async fn session_switch_while_idle_reads_new_session_from_start() {
    let state = tempfile::tempdir().unwrap();
    let sessions = SessionResolver::new(state.path());
    let mut executor = system_executor(state.path());
    let client = BusClient::new(sessions.clone());
    let old_paths = executor.paths().clone();

    submit(&client, Channel::System, "ping", "old-1", json!({}));
    executor.tick().await;
    assert!(response_for(&old_paths, "old-1").is_some());

    let new_session = sessions.new_session().unwrap();
    let new_paths = sessions.channel_paths(&new_session, Channel::System);
    submit(&client, Channel::System, "ping", "new-1", json!({}));
    // Late append to the old session: must not be consumed.
    switchyard_bus::append_record(
        &old_paths.requests,
        &switchyard_core::RequestRecord::new("ping", CorrelationId::from_raw("old-2"), Map::new()),
    )
    .unwrap();

    executor.tick().await;
    assert_eq!(executor.session_id(), &new_session);
    assert!(response_for(&new_paths, "new-1").is_some());
    assert!(response_for(&old_paths, "old-2").is_none());
    assert!(response_for(&new_paths, "old-2").is_none());
}

#[tokio::test]
async fn session_switch_cancels_into_old_session() {
    let state = tempfile::tempdir().unwrap();
    let sessions = SessionResolver::new(state.path());
    let bin = fake_worker(state.path(), "codex", "sleep 30");
    let mut executor = codex_executor(state.path(), &bin);
    let client = BusClient::new(sessions.clone());
    let old_paths = executor.paths().clone();

    submit(&client, Channel::Codex, "turn", "inflight", json!({"prompt": "long"}));
    executor.tick().await;
    assert!(executor.slot().is_running());

    let new_session = sessions.new_session().unwrap();
    executor.tick().await;

    let cancelled = response_for(&old_paths, "inflight").unwrap();
    assert_eq!(cancelled.error.as_deref(), Some("cancelled"));
    let new_paths = sessions.channel_paths(&new_session, Channel::Codex);
    assert!(responses(&new_paths).is_empty());
    assert!(new_paths.requests.exists());
    assert!(!executor.slot().is_running());
}

#[tokio::test]
async fn failed_session_attach_is_retried() {
    let state = tempfile::tempdir().unwrap();
    let sessions = SessionResolver::new(state.path());
    let mut executor = system_executor(state.path());
    let client = BusClient::new(sessions.clone());
    let old_session = executor.session_id().clone();
    let old_paths = executor.paths().clone();

    // A plain file where the session directory belongs makes attaching fail.
    let target = switchyard_core::SessionId::from_raw("sess_blocked");
    let blocker = sessions.session_dir(&target);
    std::fs::write(&blocker, "").unwrap();
    sessions.switch_session(&target).unwrap();
    switchyard_bus::append_record(
        &old_paths.requests,
        &switchyard_core::RequestRecord::new("ping", CorrelationId::from_raw("old-late"), Map::new()),
    )
    .unwrap();

    executor.tick().await;
    assert_eq!(executor.session_id(), &old_session);
    assert!(response_for(&old_paths, "old-late").is_none());

    std::fs::remove_file(&blocker).unwrap();
    submit(&client, Channel::System, "ping", "new-1", json!({}));
    for _ in 0..3 {
        executor.tick().await;
    }

    let new_paths = sessions.channel_paths(&target, Channel::System);
    assert_eq!(executor.session_id(), &target);
    assert_eq!(executor.paths(), &new_paths);
    assert!(response_for(&new_paths, "new-1").is_some());
    assert!(response_for(&new_paths, "old-late").is_none());
    assert!(response_for(&old_paths, "old-late").is_none());
}

#[tokio::test]
async fn stop_after_completion_keeps_success() {
    let state = tempfile::tempdir().unwrap();
    let mut executor = system_executor(state.path());
    let client = BusClient::new(SessionResolver::new(state.path()));
    let paths = executor.paths().clone();

    submit(&client, Channel::System, "exec", "quick", json!({"command": "true"}));
    executor.tick().await;
    assert!(executor.slot().is_running());

    let deadline = Instant::now() + DEADLINE;
    while !executor.slot().is_finished() {
        assert!(Instant::now() < deadline, "unit did not finish in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // The unit is done but not reaped; a late cancel must not rewrite it.
    assert!(!executor.slot().cancel_if(&CorrelationId::from_raw("quick")));
    executor.stop().await;

    let response = response_for(&paths, "quick").unwrap();
    assert!(response.ok);
    assert_eq!(response.exit_code, Some(0));
    assert!(response.error.is_none());
}

#[tokio::test]
async fn restart_skips_already_answered_requests() {
    let state = tempfile::tempdir().unwrap();
    let sessions = SessionResolver::new(state.path());
    let client = BusClient::new(sessions.clone());

    submit(&client, Channel::System, "ping", "done", json!({}));
    submit(&client, Channel::System, "ping", "open", json!({}));
    let (_, paths) = client.current_paths(Channel::System).unwrap();
    switchyard_bus::append_record(
        &paths.responses,
        &ResponseRecord::immediate(Channel::System, CorrelationId::from_raw("done"), true, "pong", ""),
    )
    .unwrap();

    let mut executor = system_executor(state.path());
    executor.tick().await;

    let all = responses(&paths);
    let count = |cid: &str| all.iter().filter(|r| r.correlation_id.as_str() == cid).count();
    assert_eq!(count("done"), 1);
    assert_eq!(count("open"), 1);
}

#[tokio::test]
async fn heartbeat_tracks_slot_state() {
    let state = tempfile::tempdir().unwrap();
    let bin = fake_worker(state.path(), "codex", "sleep 30");
    let mut executor = codex_executor(state.path(), &bin);
    let client = BusClient::new(SessionResolver::new(state.path()));
    let paths = executor.paths().clone();

    let idle = switchyard_bus::heartbeat::read_heartbeat(&paths.heartbeat).unwrap();
    assert_eq!(idle.state, ExecutorState::Idle);
    assert_eq!(idle.pid, std::process::id());
    assert!(idle.events_path.is_some());

    submit(&client, Channel::Codex, "turn", "hb", json!({"prompt": "x"}));
    executor.tick().await;
    let running = switchyard_bus::heartbeat::read_heartbeat(&paths.heartbeat).unwrap();
    assert_eq!(running.state, ExecutorState::Running);
    assert_eq!(running.correlation_id.as_ref().map(|c| c.as_str()), Some("hb"));

    executor.stop().await;
    assert_eq!(
        response_for(&paths, "hb").unwrap().error.as_deref(),
        Some("cancelled")
    );
}
