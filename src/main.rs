//! # switchyard
//!
//! Command-line front end: runs a channel executor or the MCP gateway, and
//! submits, cancels, polls and watches work on the bus.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde_json::{Map, Value};
use switchyard_bus::{probe, BusClient, JsonlTail, SessionResolver};
use switchyard_core::{Channel, CorrelationId, EventRecord, Resolution, SessionId};
use switchyard_settings::{load_settings_from_path, settings_path, SwitchyardSettings};
use switchyard_telemetry::{init_telemetry, TelemetryConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Executor protocol for codex, opencode and shell workers.
#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about)]
struct Cli {
    /// State directory (defaults to $SWITCHYARD_STATE_DIR or ~/.switchyard).
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the single-flight executor for one channel until interrupted.
    Executor {
        #[arg(long)]
        channel: Channel,
    },
    /// Serve the MCP gateway on stdin/stdout.
    Mcp,
    /// Inspect or change the current session.
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
    /// Append a request and print its correlation id.
    Submit {
        channel: Channel,
        /// Request type, e.g. `turn`, `exec`, `ping`.
        kind: String,
        /// Request argument as key=value; values that parse as JSON keep their type.
        #[arg(long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,
        /// Request arguments as a JSON object (merged before --arg).
        #[arg(long)]
        json: Option<String>,
        /// Block until the response arrives.
        #[arg(long)]
        wait: bool,
        /// Give up waiting after this many seconds.
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
    },
    /// Print the response for a correlation id, or `pending`.
    Result {
        correlation_id: String,
        #[arg(long)]
        channel: Option<Channel>,
        /// Session the request went to; by default every session is searched.
        #[arg(long)]
        session: Option<String>,
    },
    /// List the most recent responses on a channel.
    Results {
        channel: Channel,
        /// Defaults to the current session.
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        /// Only responses whose action matches.
        #[arg(long)]
        action: Option<String>,
    },
    /// Ask a channel to cancel a running unit.
    Cancel { channel: Channel, target: String },
    /// Stream a channel's events as JSON lines.
    Watch {
        channel: Channel,
        /// Only this correlation id; exits once its response is written.
        #[arg(long)]
        correlation_id: Option<String>,
        /// Start from the end of the log instead of the beginning.
        #[arg(long)]
        follow: bool,
    },
    /// Report executor liveness from heartbeats.
    Status,
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    Current,
    New,
    Switch { id: String },
    List,
}

fn load(cli: &Cli) -> Result<SwitchyardSettings> {
    let path = match &cli.state_dir {
        Some(dir) => dir.join("settings.json"),
        None => settings_path(),
    };
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    if let Some(dir) = &cli.state_dir {
        settings.state_dir = dir.display().to_string();
    }
    Ok(settings)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    init_telemetry(TelemetryConfig::from_level_str(
        level,
        cli.log_json || settings.logging.json,
    ));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(run(cli.command, settings))
}

async fn run(command: Command, settings: SwitchyardSettings) -> Result<()> {
    let sessions = SessionResolver::new(settings.state_dir());
    let client = BusClient::new(sessions.clone());

    match command {
        Command::Executor { channel } => {
            let shutdown = shutdown_on_ctrl_c();
            switchyard_engine::run_channel(channel, &settings, shutdown)
                .await
                .with_context(|| format!("{channel} executor failed"))?;
        }
        Command::Mcp => {
            let state = switchyard_gateway::GatewayState::from_settings(&settings)
                .context("failed to set up gateway")?;
            switchyard_gateway::run_stdio(state).await?;
        }
        Command::Session { action } => session_command(&sessions, action)?,
        Command::Submit {
            channel,
            kind,
            args,
            json,
            wait,
            timeout_secs,
        } => {
            let args = build_args(json.as_deref(), &args)?;
            let submission = client.submit(channel, &kind, args)?;
            if !wait {
                print_json(&submission)?;
                return Ok(());
            }
            let deadline = Instant::now() + Duration::from_secs(timeout_secs);
            let poll = Duration::from_millis(settings.executor.poll_interval_ms);
            loop {
                match client.result_in(&submission.session_id, channel, &submission.correlation_id)? {
                    Resolution::Completed(response) => {
                        print_json(&response)?;
                        if !response.ok {
                            std::process::exit(1);
                        }
                        break;
                    }
                    Resolution::Pending if Instant::now() >= deadline => {
                        bail!("timed out waiting for {}", submission.correlation_id)
                    }
                    Resolution::Pending => tokio::time::sleep(poll).await,
                }
            }
        }
        Command::Result {
            correlation_id,
            channel,
            session,
        } => {
            let cid = CorrelationId::from_raw(correlation_id);
            let session = session.map(parse_session).transpose()?;
            match (channel, session) {
                (Some(channel), Some(session)) => {
                    print_json(&client.result_in(&session, channel, &cid)?)?
                }
                (Some(channel), None) => print_json(&client.result(channel, &cid)?)?,
                (None, session) => match client.find_result(&cid, session.as_ref())? {
                    Some(located) => print_json(&located)?,
                    None => print_json(&Resolution::Pending)?,
                },
            }
        }
        Command::Results {
            channel,
            session,
            limit,
            action,
        } => {
            let limit = limit.unwrap_or(settings.gateway.default_list_limit);
            let session = match session {
                Some(raw) => Some(parse_session(raw)?),
                None => client.current_session(),
            };
            if let Some(session) = session {
                for response in client.results_in(&session, channel, limit, action.as_deref())? {
                    print_json(&response)?;
                }
            }
        }
        Command::Cancel { channel, target } => {
            let submission = client.cancel(channel, &CorrelationId::from_raw(target))?;
            print_json(&submission)?;
        }
        Command::Watch {
            channel,
            correlation_id,
            follow,
        } => watch(&client, &settings, channel, correlation_id, follow).await?,
        Command::Status => {
            let Some(session) = sessions.read_current_session_id() else {
                bail!("no current session");
            };
            let stale = Duration::from_millis(settings.executor.heartbeat_stale_ms);
            for channel in Channel::ALL {
                let paths = sessions.channel_paths(&session, channel);
                print_json(&probe(&paths.heartbeat, channel, stale))?;
            }
        }
    }
    Ok(())
}

fn session_command(sessions: &SessionResolver, action: SessionCommand) -> Result<()> {
    match action {
        SessionCommand::Current => match sessions.read_current_session_id() {
            Some(id) => println!("{id}"),
            None => bail!("no current session"),
        },
        SessionCommand::New => {
            let id = sessions.new_session()?;
            info!(session_id = %id, "session created");
            println!("{id}");
        }
        SessionCommand::Switch { id } => {
            let id = SessionId::from_raw(id);
            sessions.switch_session(&id)?;
            info!(session_id = %id, "session switched");
            println!("{id}");
        }
        SessionCommand::List => {
            let current = sessions.read_current_session_id();
            for id in sessions.list_sessions()? {
                let marker = if current.as_ref() == Some(&id) { "*" } else { " " };
                println!("{marker} {id}");
            }
        }
    }
    Ok(())
}

async fn watch(
    client: &BusClient,
    settings: &SwitchyardSettings,
    channel: Channel,
    correlation_id: Option<String>,
    follow: bool,
) -> Result<()> {
    if !channel.has_events() {
        bail!("{channel} has no event log");
    }
    let Some(session) = client.current_session() else {
        bail!("no current session");
    };
    let paths = client.sessions().channel_paths(&session, channel);
    let Some(events_path) = paths.events.clone() else {
        bail!("{channel} has no event log");
    };
    let offset = if follow {
        std::fs::metadata(&events_path).map(|m| m.len()).unwrap_or(0)
    } else {
        0
    };
    let interval = Duration::from_millis(settings.executor.poll_interval_ms);
    let target = correlation_id.map(CorrelationId::from_raw);
    let shutdown = shutdown_on_ctrl_c();

    let events = JsonlTail::<EventRecord>::from_offset(&events_path, offset).stream(interval);
    futures::pin_mut!(events);
    let mut done_check = tokio::time::interval(interval);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            event = events.next() => match event {
                Some(event) => {
                    if target.as_ref().map_or(true, |t| *t == event.correlation_id) {
                        print_json(&event)?;
                    }
                }
                None => break,
            },
            _ = done_check.tick(), if target.is_some() => {
                if let Some(cid) = &target {
                    if let Resolution::Completed(response) = client.result_in(&session, channel, cid)? {
                        // Events precede the response in the log; one more
                        // poll picks up any not yet yielded.
                        while let Ok(Some(event)) =
                            tokio::time::timeout(interval * 2, events.next()).await
                        {
                            if event.correlation_id == *cid {
                                print_json(&event)?;
                            }
                        }
                        print_json(&response)?;
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

fn parse_session(raw: String) -> Result<SessionId> {
    let id = SessionId::from_raw(raw);
    if !id.is_valid() {
        bail!("invalid session id {id:?}");
    }
    Ok(id)
}

fn build_args(json: Option<&str>, pairs: &[String]) -> Result<Map<String, Value>> {
    let mut args = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("--json is not valid JSON")? {
            Value::Object(map) => map,
            _ => bail!("--json must be a JSON object"),
        },
        None => Map::new(),
    };
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("--arg expects KEY=VALUE, got {pair:?}");
        };
        let value =
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        let _ = args.insert(key.to_string(), value);
    }
    Ok(args)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        trigger.cancel();
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn args_from_pairs_and_json() {
        let args = build_args(
            Some(r#"{"prompt": "list files", "think": false}"#),
            &["think=true".into(), "cwd=~/repo".into()],
        )
        .unwrap();
        assert_eq!(args["prompt"], "list files");
        assert_eq!(args["think"], json!(true));
        assert_eq!(args["cwd"], "~/repo");
    }

    #[test]
    fn bad_args_are_rejected() {
        assert!(build_args(None, &["novalue".into()]).is_err());
        assert!(build_args(Some("[1]"), &[]).is_err());
    }

    #[test]
    fn session_ids_are_checked() {
        assert!(parse_session("sess_1".into()).is_ok());
        assert!(parse_session("../up".into()).is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::parse_from(["switchyard", "executor", "--channel", "codex"]);
        assert!(matches!(
            cli.command,
            Command::Executor {
                channel: Channel::Codex
            }
        ));

        let cli = Cli::parse_from([
            "switchyard",
            "--state-dir",
            "/tmp/yard",
            "submit",
            "system",
            "exec",
            "--arg",
            "command=ls",
            "--wait",
        ]);
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/yard")));
        assert!(matches!(cli.command, Command::Submit { wait: true, .. }));
    }
}
