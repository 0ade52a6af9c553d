//! kr - keystroke recorder & replay
//!
//! Terminal front-end for the recorder session. Type a command and press
//! Enter; the status line updates as the session moves between states.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{never, select, unbounded, Receiver};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use keyreplay_recorder::prelude::*;

#[derive(Parser)]
#[command(name = "kr")]
#[command(about = "Record keystrokes and clicks, then replay them with the original timing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive record/replay session
    Session {
        /// Number of times to replay the recording
        #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
        runs: u32,

        /// Seconds to wait between runs
        #[arg(long, default_value = "1.0")]
        run_delay: f64,

        /// Seconds added to every gap between events
        #[arg(long, default_value = "0.0")]
        extra_delay: f64,

        /// Countdown seconds before recording or replay starts
        #[arg(long, default_value = "2")]
        countdown: u32,

        /// Print status as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Check/request permissions
    Permissions {
        /// Request if not granted
        #[arg(long)]
        request: bool,
    },
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data) }
    }
}

fn print_json<T: Serialize>(output: &T) -> Result<()> {
    println!("{}", serde_json::to_string(output)?);
    Ok(())
}

// ── Interactive commands ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Command {
    ToggleRecording,
    ToggleReplay,
    CancelCountdown,
    Runs(u32),
    RunDelay(f64),
    ExtraDelay(f64),
    Status,
    Events,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next();

        let seconds = |arg: Option<&str>| -> Result<f64, String> {
            let v: f64 = arg
                .ok_or("missing seconds")?
                .parse()
                .map_err(|_| "seconds must be a number".to_string())?;
            if v.is_finite() && v >= 0.0 {
                Ok(v)
            } else {
                Err("seconds must be non-negative".to_string())
            }
        };

        match name.as_str() {
            "r" | "record" => Ok(Self::ToggleRecording),
            "p" | "play" | "replay" => Ok(Self::ToggleReplay),
            "c" | "cancel" => Ok(Self::CancelCountdown),
            "runs" => {
                let n: u32 = arg
                    .ok_or("missing run count")?
                    .parse()
                    .map_err(|_| "run count must be a whole number".to_string())?;
                if n == 0 {
                    return Err("run count must be at least 1".into());
                }
                Ok(Self::Runs(n))
            }
            "delay" => seconds(arg).map(Self::RunDelay),
            "extra" => seconds(arg).map(Self::ExtraDelay),
            "s" | "status" => Ok(Self::Status),
            "e" | "events" => Ok(Self::Events),
            "h" | "help" | "?" => Ok(Self::Help),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            "" => Err("empty command".into()),
            other => Err(format!("unknown command '{}' (try 'help')", other)),
        }
    }
}

const HELP: &str = "\
  r, record       start recording / stop recording
  p, replay       start replay / cancel replay
  c, cancel       cancel a pending countdown
  runs <n>        replay the recording n times
  delay <secs>    pause between runs
  extra <secs>    extra pause added before every event
  s, status       print status
  e, events       print recorded events as JSON lines
  q, quit         exit";

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Session { runs, run_delay, extra_delay, countdown, json } => {
            let replay = ReplayConfig::default()
                .with_runs(runs)
                .with_run_delay(run_delay)
                .with_extra_delay(extra_delay);
            let config = SessionConfig { countdown_ticks: countdown, ..Default::default() };
            session(config, replay, json)
        }
        Commands::Permissions { request } => permissions(request),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn session(config: SessionConfig, replay: ReplayConfig, json: bool) -> Result<()> {
    let mut session = RecorderSession::new(Arc::new(NativeInput::new()), Arc::new(SystemClock::new()), config);
    session.set_replay_config(replay);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    if !json {
        println!("Type 'help' for commands. Ctrl+C to quit.");
    }
    render(&session, json)?;

    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;

    while running.load(Ordering::SeqCst) {
        select! {
            recv(lines) -> line => match line {
                Ok(line) => {
                    if !apply(&mut session, &line, json)? {
                        break;
                    }
                }
                // stdin closed: let any replay in flight finish, then exit
                Err(_) => stdin_open = false,
            },
            default(Duration::from_millis(50)) => {}
        }
        if !stdin_open {
            lines = never();
        }

        if session.pump() {
            render(&session, json)?;
        }
        if !stdin_open && session.state() == SessionState::Idle {
            break;
        }
    }

    info!("shutting down");
    session.shutdown();
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Apply one typed command. Returns `false` to quit.
fn apply(session: &mut RecorderSession, line: &str, json: bool) -> Result<bool> {
    let cmd = match Command::parse(line) {
        Ok(cmd) => cmd,
        Err(e) if e == "empty command" => return Ok(true),
        Err(e) => {
            eprintln!("{}", e);
            return Ok(true);
        }
    };

    let accepted = match cmd {
        Command::ToggleRecording => session.toggle_recording(),
        Command::ToggleReplay => session.toggle_replay(),
        Command::CancelCountdown => session.request_cancel_countdown(),
        Command::Runs(_) | Command::RunDelay(_) | Command::ExtraDelay(_) => {
            let config = session.replay_config();
            session.set_replay_config(match cmd {
                Command::Runs(n) => config.with_runs(n),
                Command::RunDelay(s) => config.with_run_delay(s),
                Command::ExtraDelay(s) => config.with_extra_delay(s),
                _ => config,
            });
            describe_config(&session.replay_config(), json)?;
            return Ok(true);
        }
        Command::Status => {
            render(session, json)?;
            return Ok(true);
        }
        Command::Events => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for record in session.recording() {
                serde_json::to_writer(&mut out, record)?;
                writeln!(out)?;
            }
            return Ok(true);
        }
        Command::Help => {
            println!("{}", HELP);
            return Ok(true);
        }
        Command::Quit => return Ok(false),
    };

    if accepted {
        render(session, json)?;
    } else if session.status().last_error.is_some() {
        render(session, json)?;
    } else {
        eprintln!("'{}' is not available while {}", line.trim(), state_label(session.state()));
    }
    Ok(true)
}

fn describe_config(config: &ReplayConfig, json: bool) -> Result<()> {
    if json {
        return print_json(&Output::ok(config));
    }
    println!(
        "Replay: {} run(s), {}s between runs, +{}s per event",
        config.run_count, config.inter_run_delay_secs, config.extra_per_event_delay_secs
    );
    Ok(())
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Idle => "idle",
        SessionState::CountingDownToRecord | SessionState::CountingDownToReplay => "counting down",
        SessionState::Recording => "recording",
        SessionState::Replaying => "replaying",
    }
}

fn render(session: &RecorderSession, json: bool) -> Result<()> {
    let status = session.status();
    if json {
        return print_json(&Output::ok(status));
    }

    let mut line = match status.state {
        SessionState::Idle => format!("Idle | {} events recorded", status.recorded_event_count),
        SessionState::CountingDownToRecord => format!("Recording in {}...", status.countdown_ticks_remaining),
        SessionState::CountingDownToReplay => format!("Replay in {}...", status.countdown_ticks_remaining),
        SessionState::Recording => format!("Recording | {} events", status.recorded_event_count),
        SessionState::Replaying => format!("Replaying {} events", status.recorded_event_count),
    };
    if let Some(err) = &status.last_error {
        line.push_str(&format!(" | error: {}", err));
    }
    println!("{}", line);
    io::stdout().flush()?;
    Ok(())
}

fn permissions(request: bool) -> Result<()> {
    let input = NativeInput::new();
    let perms = if request {
        input.request_permissions()
    } else {
        input.check_permissions()
    };

    println!("Accessibility: {}", if perms.accessibility { "OK" } else { "DENIED" });
    println!("Input Monitoring: {}", if perms.input_monitoring { "OK" } else { "DENIED" });

    if !perms.all_granted() && !request {
        println!("\nRun with --request to request permissions");
    }

    Ok(())
}
