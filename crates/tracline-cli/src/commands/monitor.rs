//! `tracline monitor ...`

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use tracline_core::{AccessLogEntry, CoreError, DaemonRecord, DaemonState, HistoryQuery};
use tracline_daemon::{send_signal, StartRequest, StopOutcome, StopSignal, Supervisor};

use crate::cli::{MonitorCommands, OutputFormat};
use crate::config::CliContext;
use crate::formatting::{display_path, format_extensions, format_timestamp, or_dash, table, tail, to_json};

const POLL: Duration = Duration::from_millis(100);
/// Extra time a detached child gets on top of the start timeout to boot.
const SPAWN_GRACE: Duration = Duration::from_secs(3);

pub async fn handle(ctx: CliContext, cmd: MonitorCommands, config_path: Option<PathBuf>) -> Result<()> {
    match cmd {
        MonitorCommands::Start {
            project,
            path,
            extensions,
            daemon,
        } => {
            let request = StartRequest {
                project_id: project,
                root: path,
                extensions: extensions.map(|list| {
                    list.into_iter()
                        .filter(|e| !e.trim().is_empty())
                        .collect()
                }),
            };
            if daemon {
                start_detached(&ctx, request, config_path).await
            } else {
                run_foreground(&ctx, request).await
            }
        }
        MonitorCommands::Stop { project } => stop(&ctx, &project).await,
        MonitorCommands::Status { project } => status(&ctx, project.as_deref()).await,
        MonitorCommands::History {
            project,
            limit,
            offset,
            action,
            format,
        } => {
            let mut query = HistoryQuery::new(limit, offset);
            if let Some(action) = action {
                query = query.with_action(action.into());
            }
            history(&ctx, &project, &query, format).await
        }
        MonitorCommands::Prune { project } => prune(&ctx, &project).await,
        MonitorCommands::Logs { project, lines } => logs(&ctx, &project, lines),
        MonitorCommands::Run { project } => {
            let settings = ctx
                .repos
                .projects
                .get(&project)
                .await?
                .ok_or_else(|| CoreError::ProjectNotFound(project.clone()))?;
            let request = StartRequest {
                project_id: project,
                root: settings.root,
                extensions: None,
            };
            run_foreground(&ctx, request).await
        }
    }
}

/// Start in this process and block until Ctrl-C or SIGTERM.
async fn run_foreground(ctx: &CliContext, request: StartRequest) -> Result<()> {
    let supervisor = ctx.supervisor();
    let project_id = request.project_id.trim().to_string();
    let record = supervisor.start(request).await?;
    let settings = ctx.repos.projects.get(&project_id).await?;

    println!(
        "{} Monitoring project '{}' (PID {})",
        "✓".green(),
        project_id,
        record.pid.unwrap_or_default()
    );
    if let Some(settings) = &settings {
        println!("  Path:       {}", settings.root.display());
        println!("  Extensions: {}", format_extensions(&settings.extensions));
    }
    println!("Press Ctrl-C to stop.");

    wait_for_shutdown().await;
    info!(project = %project_id, "Shutdown requested");

    match supervisor.stop(&project_id).await? {
        StopOutcome::Stopped(report) => {
            println!(
                "Monitor for '{}' stopped ({} events applied, {} dropped{})",
                project_id,
                report.stats.applied,
                report.stats.dropped,
                if report.graceful { "" } else { ", forced" }
            );
            if report.graceful {
                prune_after_stop(ctx, &project_id).await;
            }
        }
        other => warn!(project = %project_id, ?other, "Unexpected stop outcome"),
    }
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

/// Store settings, re-run ourselves as `monitor run` in the background and
/// wait for the record to reach RUNNING.
async fn start_detached(ctx: &CliContext, request: StartRequest, config_path: Option<PathBuf>) -> Result<()> {
    let supervisor = ctx.supervisor();
    let settings = supervisor.configure(request).await?;
    let project_id = settings.project_id.clone();

    let log_path = ctx.monitor_log_path(&project_id);
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open {}", log_path.display()))?;

    let exe = std::env::current_exe()?;
    let mut cmd = std::process::Command::new(&exe);
    cmd.arg("--db-path").arg(&ctx.config.storage.database_path);
    if let Some(path) = config_path {
        cmd.arg("--config").arg(path);
    }
    cmd.args(["monitor", "run", project_id.as_str()]);
    cmd.stdin(Stdio::null());
    cmd.stdout(log.try_clone()?);
    cmd.stderr(log);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().context("Failed to spawn background monitor")?;
    let deadline = Instant::now() + ctx.config.monitor.start_timeout() + SPAWN_GRACE;

    loop {
        if let Some(status) = child.try_wait()? {
            let output = std::fs::read_to_string(&log_path).unwrap_or_default();
            bail!(
                "Background monitor exited with {} during startup:\n{}",
                status,
                tail(&output, 10)
            );
        }
        if let Some(record) = supervisor.status(&project_id).await? {
            if record.state == DaemonState::Running && record.pid == Some(child.id()) {
                println!(
                    "{} Monitor for '{}' started in background (PID {})",
                    "✓".green(),
                    project_id,
                    child.id()
                );
                println!("  Path:       {}", settings.root.display());
                println!("  Extensions: {}", format_extensions(&settings.extensions));
                println!("  Log:        {}", log_path.display());
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            bail!(
                "Background monitor did not report RUNNING in time; see {}",
                log_path.display()
            );
        }
        tokio::time::sleep(POLL).await;
    }
}

async fn stop(ctx: &CliContext, project_id: &str) -> Result<()> {
    let supervisor = ctx.supervisor();
    match supervisor.stop(project_id).await {
        Ok(StopOutcome::Remote { pid }) => stop_remote(ctx, &supervisor, project_id, pid).await,
        Ok(StopOutcome::Reclaimed) => {
            println!(
                "Monitor for '{}' was not running; cleared its stale record",
                project_id
            );
            Ok(())
        }
        Ok(StopOutcome::Stopped(_)) => {
            println!("Monitor for '{}' stopped", project_id);
            Ok(())
        }
        Err(CoreError::NotRunning(_)) => {
            println!("Monitor for '{}' is not running", project_id);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// SIGTERM, wait for STOPPED, then SIGKILL and write STOPPED ourselves.
async fn stop_remote(ctx: &CliContext, supervisor: &Supervisor, project_id: &str, pid: u32) -> Result<()> {
    send_signal(pid, StopSignal::Terminate)
        .with_context(|| format!("Failed to signal monitor process {}", pid))?;
    info!(project = %project_id, pid, "Sent SIGTERM");

    let stop_timeout = ctx.config.monitor.stop_timeout();
    let stopped = supervisor
        .wait_for(project_id, stop_timeout, POLL, |record| {
            record.map_or(true, |r| !r.state.is_active())
        })
        .await;

    match stopped {
        Ok(_) => println!("Monitor for '{}' stopped (PID {})", project_id, pid),
        Err(CoreError::Timeout { .. }) => {
            warn!(project = %project_id, pid, "Monitor ignored SIGTERM, killing");
            if let Err(e) = send_signal(pid, StopSignal::Kill) {
                warn!(pid, error = %e, "SIGKILL failed");
            }
            supervisor.reclaim(project_id).await?;
            println!(
                "{} Monitor for '{}' did not stop within {}ms and was killed (PID {})",
                "!".yellow(),
                project_id,
                stop_timeout.as_millis(),
                pid
            );
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn status(ctx: &CliContext, project: Option<&str>) -> Result<()> {
    let supervisor = ctx.supervisor();
    let rows = match project {
        Some(id) => {
            let Some(record) = supervisor.status(id).await? else {
                println!("No monitor record for project '{}'", id);
                return Ok(());
            };
            let settings = ctx.repos.projects.get(id).await?;
            vec![(record, settings)]
        }
        None => supervisor
            .status_all()
            .await?
            .into_iter()
            .map(|s| (s.record, s.settings))
            .collect(),
    };

    if rows.is_empty() {
        println!("No monitors configured");
        return Ok(());
    }

    let mut out = table(["Project", "State", "PID", "Path", "Extensions", "Started"]);
    for (record, settings) in rows {
        out.add_row(vec![
            record.project_id.clone(),
            state_label(&record),
            record.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            settings
                .as_ref()
                .map(|s| s.root.display().to_string())
                .unwrap_or_else(|| "-".into()),
            settings
                .as_ref()
                .map(|s| format_extensions(&s.extensions))
                .unwrap_or_else(|| "-".into()),
            record
                .start_time
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_else(|| "-".into()),
        ]);
    }
    println!("{}", out);
    Ok(())
}

fn state_label(record: &DaemonRecord) -> String {
    let label = record.state.as_str().to_uppercase();
    match record.state {
        DaemonState::Running => label.green().to_string(),
        DaemonState::Starting => label.cyan().to_string(),
        DaemonState::Crashed => label.red().to_string(),
        DaemonState::Stopped => label,
    }
}

async fn history(ctx: &CliContext, project_id: &str, query: &HistoryQuery, format: OutputFormat) -> Result<()> {
    let entries = ctx.supervisor().history(project_id, query).await?;
    let root = ctx.repos.projects.get(project_id).await?.map(|s| s.root);

    match format {
        OutputFormat::Json => println!("{}", to_json(&entries)),
        _ if entries.is_empty() => println!("No file access history for '{}'", project_id),
        OutputFormat::List => {
            for entry in &entries {
                println!(
                    "{}  {:<8}  {}{}",
                    format_timestamp(&entry.timestamp),
                    entry.action.as_str(),
                    describe_path(entry, root.as_deref()),
                    entry
                        .task_id
                        .as_deref()
                        .map(|t| format!("  [{}]", t))
                        .unwrap_or_default()
                );
            }
        }
        OutputFormat::Table => {
            let mut out = table(["Time", "Action", "File", "Task"]);
            for entry in &entries {
                out.add_row(vec![
                    format_timestamp(&entry.timestamp),
                    entry.action.to_string(),
                    describe_path(entry, root.as_deref()),
                    or_dash(entry.task_id.as_deref()),
                ]);
            }
            println!("{}", out);
        }
    }
    Ok(())
}

fn describe_path(entry: &AccessLogEntry, root: Option<&std::path::Path>) -> String {
    let path = display_path(&entry.file_path, root);
    match &entry.prior_path {
        Some(prior) => format!("{} → {}", display_path(prior, root), path),
        None => path,
    }
}

async fn prune(ctx: &CliContext, project_id: &str) -> Result<()> {
    let policy = ctx.retention();
    if policy.is_unbounded() {
        println!("History retention is unbounded; set [history] limits to prune");
        return Ok(());
    }
    let removed = ctx.access_log().prune_access_log(project_id, &policy).await?;
    println!("Removed {} access log entries for '{}'", removed, project_id);
    Ok(())
}

async fn prune_after_stop(ctx: &CliContext, project_id: &str) {
    if !ctx.config.history.prune_on_stop {
        return;
    }
    match ctx.access_log().prune_access_log(project_id, &ctx.retention()).await {
        Ok(removed) => info!(project = %project_id, removed, "Pruned access log after stop"),
        Err(e) => warn!(project = %project_id, error = %e, "Failed to prune access log"),
    }
}

fn logs(ctx: &CliContext, project_id: &str, lines: Option<usize>) -> Result<()> {
    let path = ctx.monitor_log_path(project_id);
    if !path.exists() {
        println!("No log file for '{}' at {}", project_id, path.display());
        return Ok(());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match lines {
        Some(n) => println!("{}", tail(&contents, n)),
        None => print!("{}", contents),
    }
    Ok(())
}
