//! Task command handlers
//!
//! Handles starting operations, uploading files, and tracking the resulting
//! backend jobs until they reach a terminal status.

use anyhow::{Context, Result};
use cierre_core::domain::entity::EntityStatus;
use cierre_core::domain::job::{JobHandle, JobStatus, JobStatusSnapshot};
use cierre_core::dto::task::StartOperation;
use cierre_poller::{
    EntityKey, HttpTaskRepository, SessionHandle, SessionOutcome, StopReason, TrackedRun, Tracker,
};
use colored::*;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::notifier::TerminalNotifier;

/// Exit status after Ctrl-C, as shells report SIGINT
const INTERRUPTED: u8 = 130;

/// Parses the `--options` JSON body
pub fn parse_options(options: Option<&str>) -> Result<Option<JsonValue>> {
    options
        .map(|raw| serde_json::from_str(raw).context("--options must be valid JSON"))
        .transpose()
}

/// Start an operation and follow its job
pub async fn start(
    config: &Config,
    req: StartOperation,
    optimistic: Option<String>,
    detach: bool,
) -> Result<ExitCode> {
    let tracker = tracker(config);
    let optimistic = optimistic.map(EntityStatus::from);

    let run = tracker
        .start_operation(&req, optimistic)
        .await
        .with_context(|| format!("Could not start {}", req.operation))?;

    follow_run(&tracker, run, detach).await
}

/// Upload a file and follow its processing job
pub async fn upload(
    config: &Config,
    resource: &str,
    id: i64,
    file: &Path,
    detach: bool,
) -> Result<ExitCode> {
    let tracker = tracker(config);

    let run = tracker
        .upload_file(resource, id, file)
        .await
        .with_context(|| format!("Could not upload {}", file.display()))?;

    follow_run(&tracker, run, detach).await
}

/// Follow a job started elsewhere
pub async fn watch(config: &Config, handle: JobHandle) -> Result<ExitCode> {
    let tracker = tracker(config);

    match tracker.watch(handle.clone()) {
        Some(session) => follow(&tracker, session).await,
        None => anyhow::bail!("{} is already being tracked", handle),
    }
}

/// Show one status snapshot of a job
pub async fn status(config: &Config, handle: &JobHandle) -> Result<ExitCode> {
    let snapshot = config
        .client()
        .task_status(handle)
        .await
        .with_context(|| format!("Failed to fetch status of task {}", handle.task_id))?;

    print_snapshot(handle, &snapshot);
    Ok(ExitCode::SUCCESS)
}

fn tracker(config: &Config) -> Tracker {
    let repository = Arc::new(HttpTaskRepository::new(config.client()));
    Tracker::new(
        repository,
        Arc::new(TerminalNotifier),
        config.poller.clone(),
    )
}

async fn follow_run(tracker: &Tracker, run: TrackedRun, detach: bool) -> Result<ExitCode> {
    match run {
        TrackedRun::Completed(body) => {
            print_result(&body);
            Ok(ExitCode::SUCCESS)
        }
        TrackedRun::Detached(handle) => {
            print_watch_hint(&handle);
            Ok(ExitCode::SUCCESS)
        }
        TrackedRun::Polling(session) if detach => {
            let handle = session.job().clone();
            session.stop();
            print_watch_hint(&handle);
            Ok(ExitCode::SUCCESS)
        }
        TrackedRun::Polling(session) => follow(tracker, session).await,
    }
}

/// Waits for a session, tearing it down on Ctrl-C
async fn follow(tracker: &Tracker, session: SessionHandle) -> Result<ExitCode> {
    let handle = session.job().clone();
    println!(
        "{} {} {}",
        "Tracking".bold(),
        handle.kind.to_string().cyan(),
        format!("task {}", handle.task_id).dimmed()
    );

    let outcome = tokio::select! {
        outcome = session.wait() => outcome?,
        _ = tokio::signal::ctrl_c() => {
            debug!("Interrupted while tracking {}", handle);
            println!();
            println!(
                "{}",
                "Stopped tracking. The job keeps running on the server.".yellow()
            );
            print_watch_hint(&handle);
            return Ok(ExitCode::from(INTERRUPTED));
        }
    };

    if let SessionOutcome::Succeeded(snapshot) = &outcome {
        if let Some(result) = &snapshot.result {
            print_result(result);
        }
    }
    if let Some(estado) = tracker.store().get(&EntityKey::of(&handle)) {
        println!("  Entity status: {}", colorize_status(&estado));
    }

    Ok(ExitCode::from(exit_status(&outcome)))
}

/// Process exit status for a finished session
fn exit_status(outcome: &SessionOutcome) -> u8 {
    match outcome {
        SessionOutcome::Succeeded(_) => 0,
        SessionOutcome::Failed { .. } => 1,
        SessionOutcome::Aborted { .. } => 2,
        SessionOutcome::Expired { .. } => 3,
        SessionOutcome::Stopped(StopReason::Guard | StopReason::Teardown) => INTERRUPTED,
    }
}

fn print_watch_hint(handle: &JobHandle) {
    println!(
        "  Follow it with: {}",
        format!(
            "cierre watch {} {} {} --kind {}",
            handle.resource, handle.owner_entity_id, handle.task_id, handle.kind
        )
        .cyan()
    );
}

fn print_result(result: &JsonValue) {
    println!("\n{}", "Result:".bold());
    if let Ok(pretty) = serde_json::to_string_pretty(result) {
        println!("{}", pretty);
    } else {
        println!("{:?}", result);
    }
}

fn print_snapshot(handle: &JobHandle, snapshot: &JobStatusSnapshot) {
    println!("{}", "Task Status:".bold());
    println!("  Task ID:  {}", handle.task_id.cyan());
    println!("  Entity:   {}/{}", handle.resource, handle.owner_entity_id);
    println!("  Status:   {}", colorize_job_status(&snapshot.status));

    if let Some(progress) = &snapshot.progress {
        println!("  Progress: {}% {}", progress.percentage, progress.description.dimmed());
    }
    if let Some(error) = &snapshot.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
    if let Some(result) = &snapshot.result {
        print_result(result);
    }
}

/// Colorize job status for display
fn colorize_job_status(status: &JobStatus) -> colored::ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Pending => status_str.yellow(),
        JobStatus::Progress => status_str.cyan(),
        JobStatus::Success => status_str.green(),
        JobStatus::Failure => status_str.red(),
    }
}

/// Colorize entity status for display
pub fn colorize_status(status: &EntityStatus) -> colored::ColoredString {
    let status_str = status.to_string();
    if status.is_error() {
        status_str.red()
    } else if status.is_transient() {
        status_str.cyan()
    } else if *status == EntityStatus::Finalizado {
        status_str.green()
    } else {
        status_str.normal()
    }
}
