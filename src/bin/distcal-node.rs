//! Demo node binary: boots one replica from a TOML config, serves peers over
//! TCP, and accepts scheduling commands on stdin.
//!
//! Mirrors `flyingrobots-echo`'s `jitosd` entry point: `clap` for argv,
//! `tracing-subscriber`'s `EnvFilter` for log verbosity, `tokio::main` to
//! drive everything from one multi-threaded runtime.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use distcal::appointment::{AppointmentId, NodeId};
use distcal::{CalendarError, NodeConfig, Replica};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "distcal-node", about = "Replicated calendar node")]
struct Args {
    /// Path to this node's TOML config (see `NodeConfig`).
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = NodeConfig::from_toml_file(&args.config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    let replica = Replica::start(config)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let listener_handle = tokio::spawn(distcal::listener::run(replica.clone()));

    tokio::select! {
        res = listener_handle => {
            if let Ok(Err(e)) = res {
                tracing::error!(error = %e, "listener exited");
            }
        }
        _ = run_command_loop(replica.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down on ctrl-c");
        }
    }

    replica.shutdown();
    Ok(())
}

/// Reads simple line commands from stdin so the demo can be driven
/// interactively without a client library:
///
/// ```text
/// create <name> <day> <start_slot> <end_slot> <participant,participant,...>
/// cancel <appt_id>
/// read <participant> <day>
/// quit
/// ```
async fn run_command_loop(replica: Replica) {
    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::AsyncBufReadExt::lines(tokio::io::BufReader::new(stdin));

    loop {
        print!("distcal[{}]> ", replica.id());
        let _ = std::io::stdout().flush();

        let line = match tokio::io::AsyncBufReadExt::next_line(&mut lines).await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => return,
        };

        if let Err(err) = handle_line(&replica, &line).await {
            match err {
                // §7: a snapshot write failure is fatal — the in-memory
                // mutation already happened, so continuing would let memory
                // and disk permanently diverge. Fail-stop per SPEC_FULL.md §7.
                CmdError::Calendar(CalendarError::SnapshotWrite(msg)) => {
                    eprintln!("fatal: snapshot write failed: {msg}");
                    std::process::exit(1);
                }
                other => eprintln!("error: {other}"),
            }
        }
    }
}

/// Either a usage/parse mistake (printed, loop continues) or a propagated
/// `CalendarError` (some of which, per §7, must fail-stop the process).
enum CmdError {
    Usage(String),
    Calendar(CalendarError),
}

impl fmt::Display for CmdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmdError::Usage(msg) => write!(f, "{msg}"),
            CmdError::Calendar(e) => write!(f, "{e}"),
        }
    }
}

impl From<&str> for CmdError {
    fn from(msg: &str) -> Self {
        CmdError::Usage(msg.to_string())
    }
}

impl From<String> for CmdError {
    fn from(msg: String) -> Self {
        CmdError::Usage(msg)
    }
}

impl From<CalendarError> for CmdError {
    fn from(e: CalendarError) -> Self {
        CmdError::Calendar(e)
    }
}

async fn handle_line(replica: &Replica, line: &str) -> Result<(), CmdError> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("create") => {
            let name = parts.next().ok_or("usage: create <name> <day> <start> <end> <p1,p2,...>")?;
            let day: u8 = parts.next().ok_or("missing day")?.parse().map_err(|e| format!("{e}"))?;
            let start: u8 = parts.next().ok_or("missing start_slot")?.parse().map_err(|e| format!("{e}"))?;
            let end: u8 = parts.next().ok_or("missing end_slot")?.parse().map_err(|e| format!("{e}"))?;
            let participants: BTreeSet<NodeId> = parts
                .next()
                .ok_or("missing participants")?
                .split(',')
                .map(|s| s.parse::<u16>().map(NodeId).map_err(|e| format!("{e}")))
                .collect::<Result<_, _>>()?;
            let id = replica.create(name, day, start, end, participants).await?;
            println!("scheduled {id}");
        }
        Some("cancel") => {
            let id = parts.next().ok_or("usage: cancel <appt_id>")?;
            replica.cancel(&AppointmentId(id.to_string())).await?;
            println!("cancelled {id}");
        }
        Some("read") => {
            let participant: u16 = parts.next().ok_or("usage: read <participant> <day>")?.parse().map_err(|e| format!("{e}"))?;
            let day: u8 = parts.next().ok_or("missing day")?.parse().map_err(|e| format!("{e}"))?;
            let grid = replica.read_calendar().await;
            for slot in 0..distcal::appointment::NUM_SLOTS {
                if let Some(id) = grid.occupant(NodeId(participant), day, slot) {
                    println!("slot {slot}: {id}");
                }
            }
        }
        Some("quit") | Some("exit") => std::process::exit(0),
        Some(other) => return Err(CmdError::Usage(format!("unknown command: {other}"))),
        None => {}
    }
    Ok(())
}
