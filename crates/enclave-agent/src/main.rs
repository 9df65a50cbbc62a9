//! # enclave-agent
//!
//! Command-line entry point. Runs a scripted session against a real sandboxed
//! workspace, prints a session's audit log, and sizes or removes workspaces.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use enclave_runtime::{
    ChannelSink, ExternalEvent, RuntimeServices, SCRIPTED_AGENT_TYPE, ScriptedAgentFactory,
    SessionRecord, SessionRunner,
};
use enclave_sandbox::{AuditEventType, AuditTrail, WorkspaceManager};
use enclave_settings::{EnclaveSettings, RunnerMode};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

/// Quiet period after stdin closes before the session is stopped.
const SETTLE: Duration = Duration::from_millis(500);

/// Enclave sandboxed agent runtime.
#[derive(Parser, Debug)]
#[command(name = "enclave-agent", about = "Sandboxed agent sessions")]
struct Cli {
    /// Settings file (defaults to `~/.enclave/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overriding the settings file. `RUST_LOG` still wins.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted session, reading messages from stdin.
    Run {
        #[command(flatten)]
        session: SessionArgs,

        /// Runner strategy (defaults to the configured mode).
        #[arg(long)]
        mode: Option<RunnerMode>,

        /// First message sent on start.
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Print a session's audit events as JSON lines.
    Audit {
        #[command(flatten)]
        session: SessionArgs,

        /// Only events of this type, e.g. `security_violation`.
        #[arg(long = "type")]
        event_type: Option<AuditEventType>,

        /// Stop after this many events.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Inspect or remove a session workspace.
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },
}

#[derive(Subcommand, Debug)]
enum WorkspaceAction {
    /// Print the workspace size in bytes.
    Size(SessionArgs),
    /// Delete the workspace and everything in it.
    Destroy(SessionArgs),
}

#[derive(Args, Clone, Debug)]
struct SessionArgs {
    /// Tenant (user) id.
    #[arg(long)]
    tenant: String,

    /// Session id.
    #[arg(long)]
    session: String,
}

fn load_settings(config: Option<&Path>) -> Result<EnclaveSettings> {
    match config {
        Some(path) => {
            if !path.exists() {
                bail!("settings file not found: {}", path.display());
            }
            enclave_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))
        }
        None => enclave_settings::load_settings().context("Failed to load settings"),
    }
}

fn print_event(event: &ExternalEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, event_type = %event.event_type, "unprintable event"),
    }
}

/// Print events until none arrive for `idle`.
async fn drain(events: &mut UnboundedReceiver<ExternalEvent>, idle: Duration) {
    while let Ok(Some(event)) = tokio::time::timeout(idle, events.recv()).await {
        print_event(&event);
    }
}

async fn run(
    settings: EnclaveSettings,
    session: SessionArgs,
    mode: Option<RunnerMode>,
    prompt: Option<&str>,
) -> Result<()> {
    let mode = mode.unwrap_or(settings.runtime.mode);
    let services = Arc::new(RuntimeServices::new(
        settings,
        Arc::new(ScriptedAgentFactory),
        enclave_tools::default_tools(),
    ));
    let (sink, mut events) = ChannelSink::channel();
    let runner = SessionRunner::with_mode(
        SessionRecord::new(session.session, SCRIPTED_AGENT_TYPE, session.tenant),
        mode,
        services,
        Arc::new(sink),
    );

    runner
        .start(prompt)
        .await
        .context("Failed to start session")?;
    tracing::info!(session_id = runner.session_id(), %mode, "session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Err(e) = runner.send_message(&line).await {
                        tracing::warn!(error = %e, "message rejected");
                        eprintln!("error: {e}");
                    }
                }
                None => break,
            },
            Some(event) = events.recv() => print_event(&event),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    drain(&mut events, SETTLE).await;
    let _ = runner.stop().await;
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    Ok(())
}

fn audit(
    settings: &EnclaveSettings,
    session: &SessionArgs,
    event_type: Option<AuditEventType>,
    limit: Option<usize>,
) -> Result<()> {
    let workspaces = WorkspaceManager::new(&settings.storage.base_dir);
    let _ = workspaces.root(&session.tenant, &session.session)?;
    let trail = AuditTrail::new(workspaces);

    let mut out = std::io::stdout().lock();
    for event in trail.read(&session.tenant, &session.session, event_type, limit) {
        writeln!(out, "{}", serde_json::to_string(&event)?)?;
    }
    Ok(())
}

fn workspace(settings: &EnclaveSettings, action: &WorkspaceAction) -> Result<()> {
    let workspaces = WorkspaceManager::new(&settings.storage.base_dir);
    match action {
        WorkspaceAction::Size(s) => {
            let bytes = workspaces.size(&s.tenant, &s.session)?;
            println!("{bytes}");
        }
        WorkspaceAction::Destroy(s) => {
            if workspaces.destroy(&s.tenant, &s.session)? {
                println!("destroyed {}/{}", s.tenant, s.session);
            } else {
                println!("no workspace for {}/{}", s.tenant, s.session);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| settings.logging.level.clone());
    enclave_core::logging::init_subscriber(&level, settings.logging.json);

    match cli.command {
        Command::Run {
            session,
            mode,
            prompt,
        } => run(settings, session, mode, prompt.as_deref()).await,
        Command::Audit {
            session,
            event_type,
            limit,
        } => audit(&settings, &session, event_type, limit),
        Command::Workspace { action } => workspace(&settings, &action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::parse_from(["enclave-agent", "run", "--tenant", "t1", "--session", "s1"]);
        let Command::Run {
            session,
            mode,
            prompt,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(session.tenant, "t1");
        assert_eq!(session.session, "s1");
        assert!(mode.is_none());
        assert!(prompt.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn run_with_mode_and_globals() {
        let cli = Cli::parse_from([
            "enclave-agent",
            "run",
            "--tenant",
            "t1",
            "--session",
            "s1",
            "--mode",
            "direct",
            "--prompt",
            "hi",
            "--log-level",
            "debug",
            "--config",
            "/tmp/enclave.json",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/enclave.json")));
        let Command::Run { mode, prompt, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(mode, Some(RunnerMode::Direct));
        assert_eq!(prompt.as_deref(), Some("hi"));
    }

    #[test]
    fn bad_mode_rejected() {
        let parsed = Cli::try_parse_from([
            "enclave-agent", "run", "--tenant", "t", "--session", "s", "--mode", "fast",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn audit_type_filter() {
        let cli = Cli::parse_from([
            "enclave-agent",
            "audit",
            "--tenant",
            "t",
            "--session",
            "s",
            "--type",
            "security_violation",
            "--limit",
            "5",
        ]);
        let Command::Audit {
            event_type, limit, ..
        } = cli.command
        else {
            panic!("expected audit");
        };
        assert_eq!(event_type, Some(AuditEventType::SecurityViolation));
        assert_eq!(limit, Some(5));
    }

    #[test]
    fn workspace_subcommands() {
        let cli = Cli::parse_from([
            "enclave-agent", "workspace", "destroy", "--tenant", "t", "--session", "s",
        ]);
        assert!(matches!(
            cli.command,
            Command::Workspace {
                action: WorkspaceAction::Destroy(_)
            }
        ));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(Some(&dir.path().join("nope.json"))).is_err());
    }

    #[test]
    fn explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"runtime": {"mode": "direct"}}"#).unwrap();
        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.runtime.mode, RunnerMode::Direct);
    }

    #[test]
    fn workspace_size_and_destroy() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = EnclaveSettings::default();
        settings.storage.base_dir = dir.path().to_path_buf();
        let manager = WorkspaceManager::new(dir.path());
        let root = manager.create("t", "s").unwrap();
        std::fs::write(root.join("a.txt"), "abc").unwrap();

        let args = SessionArgs {
            tenant: "t".into(),
            session: "s".into(),
        };
        workspace(&settings, &WorkspaceAction::Size(args.clone())).unwrap();
        workspace(&settings, &WorkspaceAction::Destroy(args)).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn audit_rejects_bad_ids() {
        let settings = EnclaveSettings::default();
        let args = SessionArgs {
            tenant: "..".into(),
            session: "s".into(),
        };
        assert!(audit(&settings, &args, None, None).is_err());
    }
}
