//! `epuck-cli` – interactive shell for the e-puck arena explorer.
//!
//! This binary is the entry point for a simulated run.  It:
//!
//! 1. Loads `~/.epuck/config.toml`, writing the defaults on first run.
//! 2. Builds the simulated arena and starts the robot system on it.
//! 3. Prints every event published on the bus while the operator works.
//! 4. Drops the user into an **interactive REPL** with slash-commands
//!    (`/calibrate`, `/discover`, `/explore`, `/report`, `/help`, …).
//! 5. Intercepts **Ctrl-C** to stop the wheels before exiting.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, warn};

use epuck_hal::sim::SimWorld;
use epuck_hal::sim_registry::SimRegistry;
use epuck_kernel::MotorHandle;
use epuck_middleware::EventBus;
use epuck_runtime::RobotSystem;
use epuck_types::{Event, EventPayload, Melody, Verbosity};

/// Events buffered per bus channel.
const BUS_CAPACITY: usize = 256;

/// Exit status after Ctrl-C.
const INTERRUPTED: i32 = 130;

fn main() {
    // RUST_LOG selects the level (default "info"); EPUCK_LOG_FORMAT=json
    // switches to newline-delimited JSON.  Operator output stays on println!.
    let _tracing = epuck_runtime::init_tracing("epuck-cli");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            std::process::exit(1);
        }
    };
    let handle = runtime.handle().clone();

    // ── Simulated robot ───────────────────────────────────────────────────
    let system_config = cfg.system();
    let world = SimWorld::new(cfg.arena.clone(), system_config.odometry, system_config.sensor);
    let hardware = match SimRegistry::new(world.clone()).build().into_hardware_set() {
        Ok(hw) => hw,
        Err(e) => {
            error!(error = %e, "hardware registry incomplete");
            std::process::exit(1);
        }
    };
    let bus = EventBus::new(BUS_CAPACITY, cfg.min_verbosity);
    let system = runtime.block_on(async {
        spawn_event_printer(&bus);
        RobotSystem::start(hardware, &system_config, bus.clone())
    });

    println!(
        "  Arena {} × {} mm, robot at ({:.0}, {:.0})",
        cfg.arena.width, cfg.arena.height, cfg.arena.start.x, cfg.arena.start.y
    );
    if let Err(e) = runtime.block_on(system.explorer().alert(Melody::Startup)) {
        warn!(error = %e, "startup melody failed");
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let motors = system.motors().clone();
    let ctrlc_handle = handle.clone();

    if let Err(e) = ctrlc::set_handler(move || std::process::exit(interrupt(&ctrlc_handle, &motors))) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the wheels will not be stopped on Ctrl-C");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let shell = repl::Shell {
        handle,
        system: &system,
        world,
        work_timeout: cfg.work_timeout(),
    };
    repl::run(&shell, Arc::new(AtomicBool::new(false)));
    drop(shell);

    runtime.block_on(system.shutdown());
}

/// Stop the wheels from the Ctrl-C thread.  Returns the exit status.
fn interrupt(handle: &Handle, motors: &MotorHandle) -> i32 {
    println!();
    println!("{}", "⚠  Ctrl-C received – stopping the wheels …".yellow().bold());
    match handle.block_on(motors.stop()) {
        Ok(pose) => println!("  {} Stopped at ({:.0}, {:.0}).", "✓".green(), pose.x, pose.y),
        Err(e) => println!("  {} {}", "Stop failed:".red(), e),
    }
    INTERRUPTED
}

fn first_run() -> config::Config {
    let cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

/// Print bus traffic until the bus goes away.  Must run inside the runtime.
fn spawn_event_printer(bus: &EventBus) {
    let mut rx = bus.subscribe_all();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn print_event(event: &Event) {
    match &event.payload {
        EventPayload::Message { text, verbosity } => match verbosity {
            Verbosity::Important => println!("  {} {}", "!".yellow().bold(), text.bold()),
            Verbosity::Info => println!("  {} {}", "·".cyan(), text),
            Verbosity::Debug => println!("  {} {}", "·".dimmed(), text.dimmed()),
        },
        EventPayload::PoseUpdate(_) => {}
        EventPayload::CalibrationCompleted { success: true, boundary } => {
            if let Some(b) = boundary {
                println!(
                    "  {} walls located: {:.0} × {:.0} mm",
                    "✓".green(),
                    b.width(),
                    b.height()
                );
            }
        }
        EventPayload::CalibrationCompleted { success: false, .. } => {
            println!("  {} walls not located", "✗".red());
        }
        EventPayload::ObjectDiscovered(p) => {
            println!("  {} object at ({:.0}, {:.0})", "◆".magenta(), p.x, p.y);
        }
        EventPayload::PhotoCaptured {
            target,
            width,
            height,
            looks_like_object,
        } => {
            let verdict = if *looks_like_object {
                "object".green()
            } else {
                "nothing".yellow()
            };
            println!(
                "  {} photo {}×{} at ({:.0}, {:.0}): {}",
                "📷".normal(),
                width,
                height,
                target.x,
                target.y,
                verdict
            );
        }
        EventPayload::MapReport { boundary, objects } => {
            println!("{}", "  Map report".bold().underline());
            match boundary {
                Some(b) => println!(
                    "    arena   : x {:.0}..{:.0}  y {:.0}..{:.0}",
                    b.x_min, b.x_max, b.y_min, b.y_max
                ),
                None => println!("    arena   : {}", "unknown".yellow()),
            }
            println!("    objects : {}", objects.len());
        }
        EventPayload::Alert(melody) => {
            println!("  {} {:?}", "♪".cyan(), melody);
        }
        EventPayload::HardwareFault { component, message } => {
            println!("  {} {}: {}", "FAULT".red().bold(), component.bold(), message);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"                             __  "#.bold().cyan());
    println!("{}", r#"  ___        ____  __  _____/ /__"#.bold().cyan());
    println!("{}", r#" / _ \______/ __ \/ / / / __/  '_/"#.bold().cyan());
    println!("{}", r#"/  __/_____/ /_/ / /_/ / /_/ /\_\ "#.bold().cyan());
    println!("{}", r#"\___/     / .___/\__,_/\__/_/     "#.bold().cyan());
    println!("{}", r#"         /_/                       "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "e-puck explorer".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Arena discovery and object search");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use epuck_hal::sim::ArenaConfig;
    use epuck_runtime::SystemConfig;
    use epuck_types::WheelVelocity;

    #[test]
    fn interrupt_stops_the_wheels() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let config = SystemConfig::default();
        let world = SimWorld::new(ArenaConfig::default(), config.odometry, config.sensor);
        let hardware = SimRegistry::new(world.clone()).build().into_hardware_set().unwrap();
        let system = runtime.block_on(async { RobotSystem::start(hardware, &config, EventBus::default()) });

        runtime
            .block_on(system.motors().set_velocity(WheelVelocity::spin(50.0)))
            .unwrap();
        assert!(!world.velocity().unwrap().is_stop());

        assert_eq!(interrupt(runtime.handle(), system.motors()), INTERRUPTED);
        assert!(world.velocity().unwrap().is_stop());
        runtime.block_on(system.shutdown());
    }
}
