//! Instrumented demo workload
//!
//! Runs a cache-line touching loop bracketed by a checkpoint and serves
//! attach requests from inside the loop. Attach with:
//!
//!     funcscope-demo &
//!     funcscope -p $!
//!
//! # Environment Variables
//!
//! - `FUNCSCOPE_RING_CAPACITY` - Samples kept per checkpoint
//! - `FUNCSCOPE_HUGEPAGES=0` - Skip large-page detection
//! - `FUNCSCOPE_CLOCK=nanos` - Record nanoseconds instead of cycles
//! - `RUST_LOG=debug` - Show allocator and attach server decisions

use std::hint::black_box;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use funcscope_target::{Funcscope, FuncscopeBuilder};
use log::{error, info};

const CACHE_LINE: usize = 64;

#[derive(Parser)]
#[command(name = "funcscope-demo", about = "Instrumented demo workload for funcscope")]
struct Args {
    /// Check the attach socket once every N iterations
    #[arg(short = 'n', value_name = "N", default_value_t = 65536)]
    poll_every: u64,

    /// Stop after this many seconds (0 runs until interrupted)
    #[arg(short = 's', value_name = "SECS", default_value_t = 0)]
    seconds: u64,

    /// Bytes touched per pass
    #[arg(long, default_value_t = 1024)]
    work_size: usize,

    /// Passes over the buffer per measured call
    #[arg(long, default_value_t = 4)]
    loops: usize,
}

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_stop(_sig: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

/// Reads every cache line of `buf` `loops` times.
#[inline(never)]
fn task(fs: &Funcscope, id: usize, buf: &[u64], loops: usize) {
    let Ok(_guard) = fs.scope(id) else { return };
    let mut sum = 0u64;
    for _ in 0..loops {
        for line in buf.chunks(CACHE_LINE / 8) {
            for word in line {
                sum = sum.wrapping_add(*word);
            }
        }
    }
    black_box(sum);
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // Safety: the handler only stores to an atomic.
    unsafe {
        libc::signal(libc::SIGINT, handle_stop as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_stop as libc::sighandler_t);
    }

    let fs = match FuncscopeBuilder::with_names(["task", "outer"]).build() {
        Ok(fs) => fs,
        Err(e) => {
            error!("initialize: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let task_id = fs.checkpoint_id("task").unwrap_or(0);
    let outer_id = fs.checkpoint_id("outer").unwrap_or(1);

    info!(
        "pid {}: {} checkpoints, {:?} backing, socket {}",
        std::process::id(),
        fs.num_checkpoints(),
        fs.backing(),
        fs.sock_path().display()
    );

    let buf: Vec<u64> = (0..(args.work_size / 8).max(1) as u64).collect();
    let deadline = (args.seconds > 0).then(|| Instant::now() + Duration::from_secs(args.seconds));
    let mut iterations = 0u64;

    while !STOP.load(Ordering::Relaxed) {
        fs.poll_every_n(args.poll_every);

        let _ = fs.enter(outer_id);
        task(&fs, task_id, &buf, args.loops);
        let _ = fs.exit(outer_id);

        iterations += 1;
        if iterations % args.poll_every.max(1) == 0 {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }
        }
    }

    info!("{} iterations", iterations);
    for id in 0..fs.num_checkpoints() {
        if let Ok(stats) = fs.stats(id) {
            info!("[{}] {} ({})", fs.name(id).unwrap_or_default(), stats, fs.clock().unit());
        }
    }

    if let Err(e) = fs.cleanup() {
        error!("cleanup: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
