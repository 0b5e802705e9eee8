//! `conenav` – run the navigation node against the built-in simulator.
//!
//! ```text
//! conenav [--config PATH] [--scenario PATH]
//! conenav --help
//! ```
//!
//! 1. Initialises tracing (`RUST_LOG`, `CONENAV_LOG_FORMAT`,
//!    `OTEL_EXPORTER_OTLP_ENDPOINT`).
//! 2. Loads the node configuration from `--config` or
//!    `~/.conenav/config.toml` (defaults when absent) and the scenario from
//!    `--scenario` (a built-in course when absent).
//! 3. Drives the scenario, printing progress once per simulated second.
//! 4. Stops on goal reached, timeout or **Ctrl-C**; the node always sends a
//!    final zero velocity command on the way out.

mod scenario;
mod session;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use colored::Colorize;
use tracing::warn;

use conenav_runtime::{NavConfig, config};

use crate::scenario::Scenario;
use crate::session::Outcome;

/// ConeNav: drive the arc planner and cone tracker through a simulated course.
#[derive(Parser, Debug, PartialEq)]
#[command(name = "conenav", version, about, long_about = None)]
struct Args {
    /// Node configuration TOML (default `~/.conenav/config.toml`).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulation scenario TOML (default: built-in open field).
    #[arg(short, long)]
    scenario: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = conenav_runtime::init_tracing("conenav");

    print_banner();

    let Some(cfg) = load_config(args.config.as_ref()) else {
        return ExitCode::FAILURE;
    };
    let scenario = match &args.scenario {
        Some(path) => match Scenario::load(path) {
            Ok(s) => s,
            Err(e) => {
                println!("{}: {}", "Scenario error".red(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Scenario::default(),
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the run can only end on goal or timeout");
    }

    println!(
        "  Scenario {} – goal ({:.2}, {:.2}), {} obstacle(s), {} cone(s)\n",
        scenario.name.bold(),
        scenario.goal.x,
        scenario.goal.y,
        scenario.obstacles.len(),
        scenario.cones.len()
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(session::run(cfg, &scenario, shutdown, |t, pose, twist| {
        println!(
            "  {} x={:>6.2} y={:>6.2} θ={:>5.2}  v={:>5.2} ω={:>5.2}",
            format!("[{t:>6.1}s]").dimmed(),
            pose.x,
            pose.y,
            pose.heading,
            twist.linear,
            twist.angular
        );
    }));

    match result {
        Ok(report) => {
            let verdict = match report.outcome {
                Outcome::GoalReached => "goal reached".green().bold(),
                Outcome::GoalAbandoned => "goal abandoned".yellow().bold(),
                Outcome::TimedOut => "timed out".red().bold(),
                Outcome::Interrupted => "interrupted".yellow().bold(),
            };
            println!();
            println!(
                "  {} after {:.1}s at ({:.2}, {:.2}); {} cone(s) tracked",
                verdict, report.elapsed, report.final_pose.x, report.final_pose.y, report.cones_tracked
            );
            match report.outcome {
                Outcome::GoalReached | Outcome::GoalAbandoned | Outcome::Interrupted => ExitCode::SUCCESS,
                Outcome::TimedOut => ExitCode::FAILURE,
            }
        }
        Err(e) => {
            println!("{}: {}", "Simulation failed".red(), e);
            ExitCode::FAILURE
        }
    }
}

/// Explicit path: must exist and be valid. Default path: optional.
fn load_config(path: Option<&PathBuf>) -> Option<NavConfig> {
    match path {
        Some(path) => match config::load_from(path) {
            Ok(Some(cfg)) => {
                println!("  Config loaded from {}", path.display().to_string().bold());
                Some(cfg)
            }
            Ok(None) => {
                println!("{}: no config at {}", "Config error".red(), path.display());
                None
            }
            Err(e) => {
                println!("{}: {}", "Config error".red(), e);
                None
            }
        },
        None => match config::load() {
            Ok(Some(cfg)) => {
                println!(
                    "  Config loaded from {}",
                    config::config_path().display().to_string().bold()
                );
                Some(cfg)
            }
            Ok(None) => {
                let mut cfg = NavConfig::default();
                config::apply_env_overrides(&mut cfg);
                println!("  Using default configuration.");
                Some(cfg)
            }
            Err(e) => {
                println!("{}: {}", "Config error".red(), e);
                println!("  Using default configuration.");
                Some(NavConfig::default())
            }
        },
    }
}

fn print_banner() {
    println!();
    println!("{}", "  ConeNav – arc planner & cone tracker".bold().cyan());
    println!("{}", "  ────────────────────────────────────".cyan());
    println!();
}
