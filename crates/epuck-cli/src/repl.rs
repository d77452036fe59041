//! REPL – Read-Eval-Print Loop for the e-puck explorer shell.
//!
//! Supported slash-commands:
//!   /calibrate        – measure the range sensor offset against the west wall
//!   /discover         – scan the arena and calibrate the frame on its walls
//!   /explore          – visit the arena, track and photograph objects
//!   /report           – publish the map and play the work-done melody
//!   /pose             – odometry pose next to the simulator's ground truth
//!   /proximity        – distances seen by the proximity ring
//!   /objects          – list tracked objects
//!   /status           – dispatcher state and history
//!   /place x y theta  – move the simulated robot (mm, mm, degrees)
//!   /help             – show this list
//!   /quit | /exit     – gracefully exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;

use epuck_hal::sim::SimWorld;
use epuck_runtime::{Activity, DispatchStatus, RobotSystem};
use epuck_types::{ExplorerError, Pose};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(Activity),
    Pose,
    Proximity,
    Objects,
    Status,
    Place(Pose),
    Help,
    Quit,
}

impl Command {
    /// Parse one input line.  `Err` carries the message shown to the operator.
    pub fn parse(line: &str) -> Result<Command, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err("empty command".to_string());
        };
        let args: Vec<&str> = words.collect();

        let command = match head {
            "/calibrate" => Command::Run(Activity::Calibrate),
            "/discover" => Command::Run(Activity::Discover),
            "/explore" => Command::Run(Activity::Explore),
            "/report" => Command::Run(Activity::Report),
            "/pose" => Command::Pose,
            "/proximity" => Command::Proximity,
            "/objects" => Command::Objects,
            "/status" => Command::Status,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            "/place" => return parse_place(&args),
            other => return Err(format!("unknown command '{other}'")),
        };
        if !args.is_empty() {
            return Err(format!("{head} takes no arguments"));
        }
        Ok(command)
    }
}

fn parse_place(args: &[&str]) -> Result<Command, String> {
    let [x, y, theta] = args else {
        return Err("usage: /place <x mm> <y mm> <theta deg>".to_string());
    };
    let number = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("'{s}' is not a number"))
    };
    Ok(Command::Place(Pose::new(
        number(*x)?,
        number(*y)?,
        number(*theta)?.to_radians(),
    )))
}

/// Everything the shell drives.
pub struct Shell<'a> {
    pub handle: Handle,
    pub system: &'a RobotSystem,
    pub world: SimWorld,
    pub work_timeout: Duration,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(shell: &Shell<'_>, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "epuck>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match Command::parse(line) {
            Ok(Command::Run(activity)) => cmd_run(shell, activity),
            Ok(Command::Pose) => cmd_pose(shell),
            Ok(Command::Proximity) => cmd_proximity(shell),
            Ok(Command::Objects) => cmd_objects(shell),
            Ok(Command::Status) => print_status(&shell.system.dispatcher().status()),
            Ok(Command::Place(pose)) => cmd_place(shell, pose),
            Ok(Command::Help) => cmd_help(),
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(msg) => {
                println!(
                    "{} {}. Type {} for available commands.",
                    "Error:".red(),
                    msg.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Explorer Commands".bold().underline());
    println!("  {}        – measure the range sensor offset", "/calibrate".bold().cyan());
    println!("  {}         – locate the walls, calibrate the frame", "/discover".bold().cyan());
    println!("  {}          – find and photograph objects", "/explore".bold().cyan());
    println!("  {}           – publish the map", "/report".bold().cyan());
    println!("  {}             – odometry and true pose", "/pose".bold().cyan());
    println!("  {}        – proximity ring distances", "/proximity".bold().cyan());
    println!("  {}          – tracked objects", "/objects".bold().cyan());
    println!("  {}           – dispatcher state", "/status".bold().cyan());
    println!("  {}  – move the simulated robot", "/place x y theta".bold().cyan());
    println!("  {}      – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_run(shell: &Shell<'_>, activity: Activity) {
    let dispatcher = shell.system.dispatcher();
    let outcome: Result<DispatchStatus, ExplorerError> = shell.handle.block_on(async {
        dispatcher.request(activity).await?;
        println!("  {} {} …", "▶".cyan(), activity.to_string().bold());
        dispatcher.wait_until_end_of_work(shell.work_timeout).await
    });

    match outcome {
        Ok(status) => match &status.last_error {
            None => println!("  {} {} finished", "✓".green().bold(), activity),
            Some(e) => println!("  {} {} failed: {}", "✗".red().bold(), activity, e),
        },
        Err(e @ ExplorerError::IllegalAction { .. }) => {
            println!("  {} {}", "Refused:".yellow().bold(), e);
        }
        Err(e) => println!("  {}: {}", "Error".red(), e),
    }
}

fn cmd_pose(shell: &Shell<'_>) {
    let odometry = shell.system.motors().last_pose();
    println!("  odometry : {}", format_pose(&odometry).bold());
    match shell.world.true_pose() {
        Ok(truth) => println!("  truth    : {}", format_pose(&truth).dimmed()),
        Err(e) => println!("  truth    : {}", e.to_string().red()),
    }
}

fn cmd_proximity(shell: &Shell<'_>) {
    match shell.handle.block_on(shell.system.explorer().proximity_distances()) {
        Ok(distances) => {
            for (i, d) in distances.iter().enumerate() {
                println!("  ir{i}      : {d:.0} mm");
            }
        }
        Err(ExplorerError::NotCalibrated) => {
            println!("  {} run {} first", "not calibrated:".yellow(), "/calibrate".bold());
        }
        Err(e) => println!("  {}: {}", "Error".red(), e),
    }
}

fn cmd_objects(shell: &Shell<'_>) {
    let (boundary, objects) = shell.handle.block_on(async {
        let explorer = shell.system.explorer();
        (explorer.boundary().await, explorer.objects().await)
    });

    match boundary {
        Some(b) => println!(
            "  arena    : x {:.0}..{:.0}  y {:.0}..{:.0}",
            b.x_min, b.x_max, b.y_min, b.y_max
        ),
        None => println!("  arena    : {}", "not discovered".yellow()),
    }
    if objects.is_empty() {
        println!("  {}", "no objects tracked".dimmed());
    }
    for (i, p) in objects.iter().enumerate() {
        println!("  #{:<3} ({:.0}, {:.0})", i + 1, p.x, p.y);
    }
}

fn cmd_place(shell: &Shell<'_>, pose: Pose) {
    match shell.world.place(pose) {
        Ok(()) => println!(
            "  {} robot placed at {}",
            "✓".green().bold(),
            format_pose(&pose)
        ),
        Err(e) => println!("  {}: {}", "Error".red(), e),
    }
}

fn print_status(status: &DispatchStatus) {
    let flag = |b: bool| if b { "yes".green() } else { "no".yellow() };
    println!("  state      : {}", status.state.to_string().bold());
    println!("  discovered : {}", flag(status.history.discovered));
    println!("  explored   : {}", flag(status.history.explored));
    println!("  completed  : {}", status.completed);
    if let Some(e) = &status.last_error {
        println!("  last error : {}", e.to_string().red());
    }
}

fn format_pose(pose: &Pose) -> String {
    format!(
        "({:.1}, {:.1}) {:.1}°",
        pose.x,
        pose.y,
        pose.theta.to_degrees()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn parses_activities() {
        assert_eq!(Command::parse("/discover"), Ok(Command::Run(Activity::Discover)));
        assert_eq!(Command::parse("  /report  "), Ok(Command::Run(Activity::Report)));
        assert_eq!(Command::parse("/exit"), Ok(Command::Quit));
        assert_eq!(Command::parse("/proximity"), Ok(Command::Proximity));
    }

    #[test]
    fn place_takes_degrees() {
        let Ok(Command::Place(pose)) = Command::parse("/place 100 -20.5 90") else {
            panic!("expected a place command");
        };
        assert_eq!(pose.x, 100.0);
        assert_eq!(pose.y, -20.5);
        assert!((pose.theta - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Command::parse("/place 1 2").is_err());
        assert!(Command::parse("/place 1 2 north").is_err());
        assert!(Command::parse("/place 1 2 NaN").is_err());
        assert!(Command::parse("/explore now").is_err());
        assert!(Command::parse("/dance").is_err());
        assert!(Command::parse("").is_err());
    }

    #[test]
    fn format_pose_uses_degrees() {
        assert_eq!(format_pose(&Pose::new(1.0, 2.0, PI)), "(1.0, 2.0) 180.0°");
    }
}
