//! `maintctl` – command-line front end for the CNC maintenance backend.
//!
//! Drives the same engine the UI shell uses: the command registry for
//! one-shot calls, plus interactive flows for PDF import, session
//! monitoring and backup progress.

mod logging;
mod render;
mod serve;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, MultiSelect, Password};
use engine::guard::AppRoute;
use engine::import::{BatchSummary, RecordBadge};
use engine::monitor::{PollOutcome, SessionState};
use engine::services::PdfUpload;
use engine::types::*;
use engine::{AppContext, CommandRegistry, CommandResult, EngineConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "maintctl",
    version,
    about = "Command-line client for the CNC maintenance backend"
)]
struct Cli {
    /// Extra configuration file layered over the defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of configuration.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and persist the session.
    Login {
        username: String,
        /// Read from a prompt when omitted.
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Sign out and clear the stored session.
    Logout {
        #[arg(long)]
        json: bool,
    },

    /// Show the signed-in user.
    Whoami {
        #[arg(long)]
        json: bool,
    },

    /// Invoke a registry command by name with JSON args.
    Call {
        /// Command name (e.g. "machines.list", "parts.create").
        cmd: String,
        /// JSON args to pass to the command.
        #[arg(long, default_value = "{}")]
        args: String,
        #[arg(long)]
        json: bool,
        /// Write result.json and events.jsonl under this directory.
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },

    /// List registry commands with their minimum role.
    Commands,

    /// Targeted check: backend, storage or session.
    Probe {
        target: String,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },

    /// Run a scripted scenario from a YAML file.
    RunScenario {
        file: PathBuf,
        #[arg(long)]
        artifacts: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Start daemon mode over a Unix socket.
    Serve {
        #[arg(long)]
        socket: PathBuf,
    },

    /// Extract machines from a PDF and create the selected ones.
    Import {
        file: PathBuf,
        /// Take the preselection without prompting.
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        json: bool,
    },

    /// Watch the session expiry and offer to extend it.
    Monitor {
        /// Evaluate once and exit.
        #[arg(long)]
        once: bool,
        /// Never prompt; only report.
        #[arg(long)]
        no_prompt: bool,
        #[arg(long)]
        json: bool,
    },

    /// Follow a backup job until it completes or fails.
    BackupWatch {
        /// Existing job to follow. Starts a new backup when omitted.
        backup_id: Option<String>,
        /// Start a complete backup instead of a database backup.
        #[arg(long, conflicts_with = "backup_id")]
        complete: bool,
        #[arg(long)]
        json: bool,
    },
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(2);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::load_with(cli.config.as_deref())
        .context("failed to load configuration")?;
    logging::init_logging(&config.logging, cli.verbose);

    let ctx = AppContext::from_config(config).context("failed to build HTTP client")?;
    let registry = CommandRegistry::new();

    match cli.command {
        Commands::Login {
            username,
            password,
            json,
        } => cmd_login(username, password, json, &ctx, &registry).await,
        Commands::Logout { json } => {
            let result = registry.execute("auth.logout", serde_json::json!({}), &ctx).await;
            output_result(&result, json);
            Ok(())
        }
        Commands::Whoami { json } => {
            let result = registry.execute("auth.me", serde_json::json!({}), &ctx).await;
            output_result(&result, json);
            Ok(())
        }
        Commands::Call {
            cmd,
            args,
            json,
            artifacts,
        } => {
            cmd_call(&cmd, &args, json, artifacts, &ctx, &registry).await;
            Ok(())
        }
        Commands::Commands => {
            for name in registry.list() {
                let role = registry
                    .min_role(name)
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "public".to_string());
                println!("{:<28} {}", name, role);
            }
            Ok(())
        }
        Commands::Probe {
            target,
            json,
            artifacts,
        } => {
            let result = engine::probes::run_probe(&target, &ctx).await;
            if let Some(ref dir) = artifacts {
                write_artifacts(dir, &result.run_id, &result, std::slice::from_ref(&result));
            }
            output_result(&result, json);
            Ok(())
        }
        Commands::RunScenario {
            file,
            artifacts,
            json,
        } => {
            cmd_run_scenario(&file, json, artifacts, &ctx, &registry).await;
            Ok(())
        }
        Commands::Serve { socket } => serve::run_daemon(socket, ctx, registry).await,
        Commands::Import { file, yes, json } => cmd_import(&file, yes, json, &ctx).await,
        Commands::Monitor {
            once,
            no_prompt,
            json,
        } => cmd_monitor(once, no_prompt, json, &ctx).await,
        Commands::BackupWatch {
            backup_id,
            complete,
            json,
        } => cmd_backup_watch(backup_id, complete, json, &ctx).await,
    }
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

async fn cmd_login(
    username: String,
    password: Option<String>,
    json: bool,
    ctx: &AppContext,
    registry: &CommandRegistry,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => Password::new()
            .with_prompt(format!("Passwort für {}", username))
            .interact()
            .context("password prompt failed")?,
    };
    let args = serde_json::json!({ "username": username, "password": password });
    let result = registry.execute("auth.login", args, ctx).await;
    output_result(&result, json);
    Ok(())
}

async fn cmd_call(
    cmd: &str,
    args_str: &str,
    json: bool,
    artifacts: Option<PathBuf>,
    ctx: &AppContext,
    registry: &CommandRegistry,
) {
    let args: serde_json::Value = match serde_json::from_str(args_str) {
        Ok(v) => v,
        Err(e) => {
            let r = Run::start("call", cmd)
                .error(ErrorCode::InvalidInput, format!("invalid JSON args: {}", e));
            output_result(&r, json);
            return;
        }
    };

    let result = registry.execute(cmd, args, ctx).await;
    if let Some(ref dir) = artifacts {
        write_artifacts(dir, &result.run_id, &result, std::slice::from_ref(&result));
    }
    output_result(&result, json);
}

fn read_scenario(file: &Path) -> std::result::Result<Scenario, CommandResult> {
    let run = Run::start("run-scenario", file.display().to_string());
    let yaml = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            return Err(run.error(
                ErrorCode::IoError,
                format!("cannot read scenario file: {}", e),
            ))
        }
    };
    engine::scenario::load_scenario(&yaml).map_err(|e| run.error(ErrorCode::InvalidInput, e))
}

async fn cmd_run_scenario(
    file: &Path,
    json: bool,
    artifacts: Option<PathBuf>,
    ctx: &AppContext,
    registry: &CommandRegistry,
) {
    let scenario = match read_scenario(file) {
        Ok(s) => s,
        Err(r) => {
            output_result(&r, json);
            return;
        }
    };

    let scenario_result = engine::scenario::run_scenario(&scenario, ctx, registry).await;

    if json {
        let j = serde_json::to_string_pretty(&scenario_result).unwrap_or_default();
        println!("{}", j);
    } else {
        println!(
            "Scenario: {}",
            scenario_result.name.as_deref().unwrap_or("<unnamed>")
        );
        println!("Overall: {}", scenario_result.overall_status);
        for (i, sr) in scenario_result.step_results.iter().enumerate() {
            println!(
                "  Step {}: {} -> {} ({}ms)",
                i, sr.target, sr.status, sr.timing_ms.total
            );
            if let Some(ref err) = sr.error {
                println!("    {} – {}", err.code, err.message);
            }
        }
    }

    if let Some(ref dir) = artifacts {
        write_artifacts(
            dir,
            &scenario_result.run_id,
            &scenario_result,
            &scenario_result.step_results,
        );
    }

    exit_for(scenario_result.overall_status);
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

async fn cmd_import(file: &Path, yes: bool, json: bool, ctx: &AppContext) -> Result<()> {
    let user = ctx.session().current_user();
    let decision = AppRoute::MachineImport.check(user.as_ref());
    if !decision.is_allowed() {
        bail!(
            "import requires the {} role (guard: {:?})",
            AppRoute::MachineImport
                .required_role()
                .map(|r| r.to_string())
                .unwrap_or_default(),
            decision
        );
    }

    let upload = PdfUpload::from_path(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let mut wizard = ctx.import_wizard();
    wizard.select_file(upload)?;

    eprintln!("PDF wird verarbeitet …");
    let extraction = wizard.process().await?;
    eprintln!(
        "{} Maschinen gefunden ({} gültig, {} bereits vorhanden).",
        extraction.total_machines_found,
        extraction.valid_machines,
        extraction.duplicate_machines
    );

    let records = wizard.records();
    for r in &records {
        eprintln!(
            "  [{}] {:<16} {:<20} {:>10} {:<10} {}",
            if r.selected { "x" } else { " " },
            r.machine.machine_number,
            r.machine.machine_type.as_deref().unwrap_or("–"),
            r.machine
                .operating_hours
                .map(|h| engine::format::hours(h.into()))
                .unwrap_or_default(),
            r.machine
                .installation_date
                .map(|d| engine::format::local_date(&d))
                .unwrap_or_default(),
            r.badge.label_de()
        );
        for problem in &r.machine.validation_errors {
            eprintln!("        {}", problem);
        }
    }

    let ready: Vec<_> = records
        .iter()
        .filter(|r| r.badge == RecordBadge::Ready)
        .collect();
    if ready.is_empty() {
        bail!("Keine importierbaren Maschinen gefunden.");
    }

    if !yes {
        let items: Vec<String> = ready
            .iter()
            .map(|r| {
                format!(
                    "{} ({})",
                    r.machine.machine_number,
                    r.machine.machine_type.as_deref().unwrap_or("–")
                )
            })
            .collect();
        let defaults: Vec<bool> = ready.iter().map(|r| r.selected).collect();
        let chosen = MultiSelect::new()
            .with_prompt("Zu importierende Maschinen")
            .items(&items)
            .defaults(&defaults)
            .interact()
            .context("selection prompt failed")?;

        wizard.clear_selection()?;
        for pos in chosen {
            wizard.select(ready[pos].index)?;
        }
    }

    let mut progress = wizard.subscribe_progress();
    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = progress.borrow_and_update().clone();
            if let Some(p) = current {
                eprintln!("  {}/{} {}", p.current, p.total, p.machine_number);
            }
        }
    });
    let summary = wizard.create_selected().await.cloned();
    printer.abort();
    let summary = summary?;

    print_summary(&summary, json);
    wizard.finish_to_list(ctx.cache())?;

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &BatchSummary, json: bool) {
    if json {
        let j = serde_json::to_string_pretty(summary).unwrap_or_default();
        println!("{}", j);
        return;
    }
    println!(
        "{} von {} Maschinen angelegt, {} fehlgeschlagen.",
        summary.successfully_created, summary.total_machines, summary.failed
    );
    for r in &summary.results {
        match (&r.error, r.machine_id) {
            (None, Some(id)) => println!("  OK    {} (ID {})", r.machine_number, id),
            (Some(err), _) => println!("  FEHLER {}: {}", r.machine_number, err),
            (None, None) => println!("  OK    {}", r.machine_number),
        }
    }
}

// ---------------------------------------------------------------------------
// Session monitor
// ---------------------------------------------------------------------------

async fn cmd_monitor(once: bool, no_prompt: bool, json: bool, ctx: &AppContext) -> Result<()> {
    let monitor = Arc::new(ctx.session_monitor());
    if once {
        print_outcome(&monitor.poll(), json);
        return Ok(());
    }

    let mut handle = monitor.spawn();
    print_outcome(&handle.latest(), json);

    loop {
        let outcome = tokio::select! {
            o = handle.changed() => o,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(outcome) = outcome else {
            break;
        };
        print_outcome(&outcome, json);

        if outcome.logged_out || outcome.state == SessionState::NoSession {
            break;
        }
        if outcome.newly_warned && !no_prompt {
            let extend = Confirm::new()
                .with_prompt("Sitzung verlängern?")
                .default(true)
                .interact()
                .context("confirmation prompt failed")?;
            if extend {
                match handle.extend_session().await {
                    Ok(()) => eprintln!("Sitzung verlängert."),
                    Err(e) => {
                        eprintln!("Verlängerung fehlgeschlagen: {}", e.user_message());
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: &PollOutcome, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(outcome) {
            println!("{}", line);
        }
        return;
    }
    let expires = outcome
        .expires_at
        .map(|t| engine::format::local_datetime(&t))
        .unwrap_or_else(|| "–".to_string());
    match outcome.state {
        SessionState::NoSession => println!("Nicht angemeldet."),
        SessionState::Untracked => println!("Angemeldet, Ablaufzeit unbekannt."),
        SessionState::Active { remaining_secs } => {
            println!("Sitzung aktiv bis {} (noch {})", expires, countdown(remaining_secs))
        }
        SessionState::Warning { remaining_secs } => println!(
            "Sitzung läuft in {} ab ({})",
            countdown(remaining_secs),
            expires
        ),
        SessionState::Expired => println!("Sitzung abgelaufen, bitte erneut anmelden."),
    }
}

fn countdown(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}", secs / 60, secs % 60)
}

// ---------------------------------------------------------------------------
// Backup watch
// ---------------------------------------------------------------------------

async fn cmd_backup_watch(
    backup_id: Option<String>,
    complete: bool,
    json: bool,
    ctx: &AppContext,
) -> Result<()> {
    let backups = ctx.backups();
    let backup_id = match backup_id {
        Some(id) => id,
        None => {
            let started = if complete {
                backups.create_complete().await
            } else {
                backups.create().await
            }
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            eprintln!("Sicherung gestartet: {}", started.backup_id);
            started.backup_id
        }
    };

    let mut watch = backups.watch(&backup_id, ctx.backup_poll_interval());
    let mut last = None;
    loop {
        let update = tokio::select! {
            u = watch.changed() => u,
            _ = tokio::signal::ctrl_c() => None,
        };
        let progress = match update {
            Some(Ok(p)) => p,
            Some(Err(e)) => bail!(
                "Fortschritt der Sicherung {} nicht abrufbar: {}",
                backup_id,
                e.user_message()
            ),
            None => break,
        };
        if json {
            if let Ok(line) = serde_json::to_string(&progress) {
                println!("{}", line);
            }
        } else {
            println!(
                "{:>3}% {:?} {}",
                progress.percentage,
                progress.status,
                progress.current_step.as_deref().unwrap_or("")
            );
        }
        let terminal = progress.status.is_terminal();
        last = Some(progress);
        if terminal {
            break;
        }
    }

    match last {
        Some(p) if p.status == engine::model::BackupRunStatus::Failed => {
            bail!(
                "Sicherung {} fehlgeschlagen{}",
                backup_id,
                p.error_message
                    .map(|m| format!(": {}", m))
                    .unwrap_or_default()
            )
        }
        _ => Ok(()),
    }
}

// ===========================================================================
// Output helpers
// ===========================================================================

fn output_result(result: &CommandResult, json: bool) {
    if json {
        let j = serde_json::to_string_pretty(result).unwrap_or_default();
        println!("{}", j);
    } else {
        print_human(result);
    }
    exit_for(result.status);
}

/// Non-zero exit on fail/error.
fn exit_for(status: Status) {
    match status {
        Status::Fail => std::process::exit(1),
        Status::Error => std::process::exit(2),
        Status::Pass | Status::Skip => {}
    }
}

fn print_human(r: &CommandResult) {
    println!(
        "[{}] {} {}",
        r.status.as_str().to_uppercase(),
        r.command,
        r.target
    );
    println!("  run_id: {}", r.run_id);
    println!("  timing: {}ms", r.timing_ms.total);
    if let Some(ref user) = r.user {
        println!("  user:   {}", user);
    }

    for (step, ms) in &r.timing_ms.steps {
        println!("    {}: {}ms", step, ms);
    }

    if let Some(ref err) = r.error {
        println!("  error:  {} – {}", err.code, err.message);
        if let Some(fields) = err.details.get("fields").and_then(|f| f.as_object()) {
            for (field, msg) in fields {
                println!("    {}: {}", field, msg.as_str().unwrap_or_default());
            }
        }
    }

    if let Some(ref data) = r.data {
        let lines = render::render(&r.target, data).unwrap_or_else(|| {
            serde_json::to_string_pretty(data)
                .map(|s| s.lines().map(String::from).collect())
                .unwrap_or_default()
        });
        for line in lines {
            println!("  {}", line);
        }
    }
}

// ===========================================================================
// Artifact helpers
// ===========================================================================

/// `<dir>/<run_id>/result.json` plus one JSON line per command in `events.jsonl`.
fn write_artifacts(
    dir: &Path,
    run_id: &str,
    summary: &impl serde::Serialize,
    events: &[CommandResult],
) {
    let art_dir = dir.join(run_id);
    if let Err(e) = std::fs::create_dir_all(&art_dir) {
        tracing::warn!(dir = %art_dir.display(), error = %e, "cannot create artifacts dir");
        return;
    }

    let j = serde_json::to_string_pretty(summary).unwrap_or_default();
    let _ = std::fs::write(art_dir.join("result.json"), j);

    let lines: String = events
        .iter()
        .filter_map(|r| serde_json::to_string(r).ok())
        .map(|line| line + "\n")
        .collect();
    let _ = std::fs::write(art_dir.join("events.jsonl"), lines);
}
