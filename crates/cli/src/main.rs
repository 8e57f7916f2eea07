// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use anyhow::Context;
use labwired_irq_core::board::{load_board, Board, MainLoopReport};
use labwired_irq_core::scheduler::ServiceSummary;
use labwired_irq_core::{DispatchReport, Fault, LineId, LineInfo, PinId, SchedulerError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

const EXIT_PASS: u8 = 0;
const EXIT_FAULTS: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const REPORT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "LabWired external interrupt line simulator",
    long_about = None
)]
struct Cli {
    /// Enable dispatch-level tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a board description and wire it up without running it.
    Check(CheckArgs),

    /// Drive lines on a board and service them through the scheduler.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Path to the board description (YAML)
    #[arg(short, long)]
    board: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the board description (YAML)
    #[arg(short, long)]
    board: PathBuf,

    /// Software-trigger a line every round (repeatable)
    #[arg(short, long = "assert", value_name = "LINE")]
    assert_lines: Vec<u8>,

    /// Press a pin every round: drive it away from its pull, then release it (repeatable)
    #[arg(short, long, value_name = "PIN")]
    press: Vec<String>,

    /// Hold a line's pending flag set so that acknowledging it has no effect
    #[arg(long, value_name = "LINE")]
    stuck: Vec<u8>,

    /// Number of assert/service/main-loop rounds
    #[arg(long, default_value = "1")]
    rounds: u32,

    /// Exit with a non-zero status if any fault was reported
    #[arg(long)]
    fail_on_fault: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Write the final register state (JSON)
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    schema_version: &'static str,
    board: String,
    status: &'static str,
    rounds_completed: u32,
    message: Option<String>,
    dispatches: u32,
    max_depth: usize,
    metrics: serde_json::Value,
    faults: Vec<FaultRecord>,
    lines: Vec<LineInfo>,
    main_loop: MainLoopReport,
    dispatch_reports: Vec<DispatchReport>,
}

#[derive(Debug, Serialize)]
struct FaultRecord {
    message: String,
    #[serde(flatten)]
    fault: Fault,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Check(args) => run_check(args),
        Commands::Run(args) => run_board(args),
    }
}

fn run_check(args: CheckArgs) -> ExitCode {
    match load_board(&args.board) {
        Ok(board) => {
            let lines = board.controller.lines();
            info!(
                "Board '{}' OK: {} lines, {} enabled",
                board.name,
                lines.len(),
                lines.iter().filter(|l| l.enabled).count()
            );
            for l in &lines {
                println!(
                    "{} {} {:?} {:?} priority {} -> {}{}",
                    l.config.id,
                    l.config.pin(),
                    l.config.edge,
                    l.config.pull,
                    l.config.priority,
                    l.group,
                    if l.enabled { "" } else { " (disabled)" }
                );
            }
            ExitCode::from(EXIT_PASS)
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

/// Pin stimulus resolved from `--press`.
#[derive(Debug, Clone, Copy)]
struct Press {
    pin: PinId,
}

fn resolve_stimulus(args: &RunArgs) -> anyhow::Result<(Vec<LineId>, Vec<LineId>, Vec<Press>)> {
    let asserts = args
        .assert_lines
        .iter()
        .map(|&n| LineId::new(n))
        .collect::<Result<Vec<_>, _>>()?;
    let stuck = args
        .stuck
        .iter()
        .map(|&n| LineId::new(n))
        .collect::<Result<Vec<_>, _>>()?;
    let presses = args
        .press
        .iter()
        .map(|p| p.parse().map(|pin| Press { pin }))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((asserts, stuck, presses))
}

fn press(board: &Board, press: Press) {
    let pull = board.hardware.port(press.pin.port).pull(press.pin.pin);
    let active = match pull {
        labwired_irq_core::Pull::Up => labwired_irq_core::peripheral::PinLevel::Low,
        _ => labwired_irq_core::peripheral::PinLevel::High,
    };
    board.hardware.drive_pin(press.pin, Some(active));
    board.hardware.drive_pin(press.pin, None);
}

fn run_board(args: RunArgs) -> ExitCode {
    let board = match load_board(&args.board) {
        Ok(b) => b,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let (asserts, stuck, presses) = match resolve_stimulus(&args) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    for line in &stuck {
        warn!("Holding {} asserted", line);
        board.hardware.set_stuck(*line, true);
    }

    let mut summary = ServiceSummary::default();
    let mut main_loop = MainLoopReport::default();
    let mut failure: Option<SchedulerError> = None;
    let mut rounds_completed = 0;

    for round in 0..args.rounds {
        for line in &asserts {
            board.hardware.assert_line(*line);
        }
        for p in &presses {
            press(&board, *p);
        }

        match board.scheduler.service() {
            Ok(s) => {
                summary.dispatches += s.dispatches;
                summary.max_depth = summary.max_depth.max(s.max_depth);
            }
            Err(e) => {
                error!("Round {}: {}", round, e);
                failure = Some(e);
                break;
            }
        }

        let pass = board.run_main_loop_once();
        main_loop.events.extend(pass.events);
        main_loop.flags.extend(pass.flags);
        main_loop.toggled.extend(pass.toggled);
        main_loop.dropped = pass.dropped;
        rounds_completed += 1;
    }

    let faults: Vec<FaultRecord> = board
        .log
        .faults()
        .into_iter()
        .map(|fault| FaultRecord {
            message: fault.to_string(),
            fault,
        })
        .collect();

    let status = if failure.is_some() {
        "error"
    } else if faults.is_empty() {
        "ok"
    } else {
        "faults"
    };

    let report = RunReport {
        schema_version: REPORT_SCHEMA_VERSION,
        board: board.name.clone(),
        status,
        rounds_completed,
        message: failure.as_ref().map(|e| e.to_string()),
        dispatches: summary.dispatches,
        max_depth: summary.max_depth,
        metrics: board.metrics.to_json(),
        faults,
        lines: board.controller.lines(),
        main_loop,
        dispatch_reports: board.scheduler.take_reports(),
    };

    let snapshot_failed = match &args.snapshot {
        Some(path) => match write_snapshot(path, &board) {
            Ok(()) => false,
            Err(e) => {
                error!("{:#}", e);
                true
            }
        },
        None => false,
    };

    if args.json {
        match serde_json::to_string(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize run report: {}", e),
        }
    } else {
        info!(
            "Board '{}': {} rounds, {} dispatches (max depth {}), {} faults",
            report.board,
            report.rounds_completed,
            report.dispatches,
            report.max_depth,
            report.faults.len()
        );
        for f in &report.faults {
            warn!("{}", f.message);
        }
        for (pin, level) in &report.main_loop.toggled {
            println!("{} -> {:?}", pin, level);
        }
    }

    if failure.is_some() || snapshot_failed {
        ExitCode::from(EXIT_RUNTIME_ERROR)
    } else if args.fail_on_fault && !report.faults.is_empty() {
        ExitCode::from(EXIT_FAULTS)
    } else {
        ExitCode::from(EXIT_PASS)
    }
}

fn write_snapshot(path: &Path, board: &Board) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create snapshot parent dir {:?}", parent))?;
        }
    }

    let snapshot = serde_json::json!({
        "snapshot_schema_version": REPORT_SCHEMA_VERSION,
        "board": board.name,
        "registers": board.hardware.snapshot(),
        "lines": board.controller.lines(),
    });

    let f = std::fs::File::create(path)
        .with_context(|| format!("Failed to create snapshot {:?}", path))?;
    serde_json::to_writer_pretty(f, &snapshot)
        .with_context(|| format!("Failed to write snapshot {:?}", path))?;
    info!("Snapshot written to {:?}", path);
    Ok(())
}
