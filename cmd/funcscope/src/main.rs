//! funcscope - print live checkpoint statistics of instrumented processes
//!
//! Usage:
//!     funcscope -p <pid> [-p <pid> ...] [-i <interval_ms>] [-r <repeat>]
//!
//! Attaches to every pid at once, then every interval prints one line per
//! checkpoint per target. `-r 0` (or negative) runs until SIGINT/SIGTERM.
//!
//! # Environment Variables
//!
//! - `FUNCSCOPE_SOCK_DIR` - Directory holding target attach sockets (default /tmp)
//! - `FUNCSCOPE_ATTACH_TIMEOUT_MS` - Give up on silent targets after this long
//! - `RUST_LOG` - Log filter (default info)

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use funcscope_tool::{attach, parse_pid, AttachConfig, Observer, MAX_TARGETS};
use log::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "funcscope",
    about = "Attach to instrumented processes and print checkpoint statistics",
    after_help = "\
EXAMPLES:
    funcscope -p 1234                     Print stats for pid 1234 every second
    funcscope -p 1234 -p 5678 -i 250 -r 8 Two targets, 8 cycles, 250ms apart"
)]
struct Args {
    /// Target process id (repeatable)
    #[arg(short = 'p', value_name = "PID", required = true, value_parser = parse_pid)]
    pids: Vec<i32>,

    /// Milliseconds between observation cycles
    #[arg(short = 'i', value_name = "MS", default_value_t = 1000)]
    interval: u64,

    /// Number of cycles (<= 0 runs until interrupted)
    #[arg(short = 'r', value_name = "N", default_value_t = 0, allow_negative_numbers = true)]
    repeat: i64,
}

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_stop(_sig: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.pids.len() > MAX_TARGETS {
        error!("at most {} targets per invocation, got {}", MAX_TARGETS, args.pids.len());
        return ExitCode::from(2);
    }

    // Safety: the handler only stores to an atomic.
    unsafe {
        libc::signal(libc::SIGINT, handle_stop as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_stop as libc::sighandler_t);
    }

    let config = AttachConfig::from_env();
    let results = match attach(&args.pids, &config) {
        Ok(results) => results,
        Err(e) => {
            error!("attach: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut regions = Vec::with_capacity(results.len());
    for (pid, result) in results {
        match result {
            Ok(region) => regions.push((pid, region)),
            Err(e) => warn!("pid {}: not attached: {}", pid, e),
        }
    }
    if regions.is_empty() {
        error!("no target attached");
        return ExitCode::FAILURE;
    }

    let mut observer = Observer::new(regions);
    for target in observer.targets() {
        info!(
            "pid {}: {} checkpoints, samples in {}",
            target.pid(),
            target.names().len(),
            target.region().clock().unit()
        );
    }

    observer.run(
        Duration::from_millis(args.interval),
        args.repeat,
        &STOP,
        |report| println!("{report}"),
    );

    if let Err(e) = observer.detach() {
        error!("detach: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
