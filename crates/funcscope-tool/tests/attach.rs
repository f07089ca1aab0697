//! Target and tool in one process: regions are served under distinct
//! endpoint ids from a private socket directory. One test re-runs this
//! binary as a separate target process.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use funcscope_core::ClockSource;
use funcscope_target::{Funcscope, FuncscopeBuilder, TargetConfig};
use funcscope_tool::{attach, AttachConfig, AttachError, Observer};

fn target(dir: &Path, id: i32, names: &[&str], capacity: u32) -> Funcscope {
    FuncscopeBuilder::with_names(names.iter().copied())
        .config(
            TargetConfig::new()
                .hugepages(false)
                .sock_dir(dir)
                .endpoint_id(id)
                .ring_capacity(capacity)
                .clock(ClockSource::Nanos),
        )
        .build()
        .unwrap()
}

fn tool_config(dir: &Path, timeout_ms: u64) -> AttachConfig {
    AttachConfig::new()
        .sock_dir(dir)
        .timeout(Duration::from_millis(timeout_ms))
}

/// Run `f` while a background thread keeps polling every target's
/// attach server, the way an instrumented hot loop would.
fn serving<R>(targets: &[&Funcscope], f: impl FnOnce() -> R) -> R {
    let stop = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            while !stop.load(Ordering::Relaxed) {
                for t in targets {
                    t.poll_every_n(1);
                }
                thread::sleep(Duration::from_millis(1));
            }
        });
        let result = f();
        stop.store(true, Ordering::Relaxed);
        result
    })
}

#[test]
fn test_end_to_end_alpha_stats() {
    let dir = tempfile::tempdir().unwrap();
    let fs = target(dir.path(), 9001, &["alpha", "beta"], 16);
    for v in 0..10 {
        fs.record(0, v).unwrap();
    }

    let mut results = serving(&[&fs], || attach(&[9001], &tool_config(dir.path(), 5000)).unwrap());
    let region = results.remove(&9001).unwrap().unwrap();

    assert_eq!(region.num_checkpoints(), 2);
    assert_eq!(region.clock(), ClockSource::Nanos);
    assert_eq!(region.name(0).as_deref(), Some("alpha"));
    assert_eq!(region.name(1).as_deref(), Some("beta"));

    let stats = region.stats(0, &mut Vec::new()).unwrap();
    assert_eq!(stats.count, 10);
    assert_eq!(stats.min, 0);
    assert_eq!(stats.max, 9);
    assert_eq!(stats.avg, 4.5);
    assert_eq!(stats.p50, 5);
    assert_eq!(stats.p99, 9);

    let beta = region.stats(1, &mut Vec::new()).unwrap();
    assert_eq!(beta.count, 0);
    assert_eq!(beta.max, 0);

    // Later samples show up through the same mapping.
    fs.record(1, 7).unwrap();
    assert_eq!(region.stats(1, &mut Vec::new()).unwrap().avg, 7.0);

    region.unmap().unwrap();
    fs.cleanup().unwrap();
}

#[test]
fn test_partial_batch() {
    let dir = tempfile::tempdir().unwrap();
    let a = target(dir.path(), 7001, &["a"], 8);
    let b = target(dir.path(), 7002, &["b"], 8);
    let c = target(dir.path(), 7003, &["c"], 8);

    let results = serving(&[&a, &b, &c], || {
        attach(&[7001, 7002, 7003, 7999], &tool_config(dir.path(), 5000)).unwrap()
    });

    assert_eq!(results.len(), 4);
    assert_eq!(results.values().filter(|r| r.is_ok()).count(), 3);
    assert!(matches!(results[&7999], Err(AttachError::Connect { .. })));

    for (_, r) in results {
        if let Ok(region) = r {
            region.unmap().unwrap();
        }
    }
}

#[test]
fn test_wrapped_ring_reports_latest_window() {
    let dir = tempfile::tempdir().unwrap();
    let fs = target(dir.path(), 9101, &["wrap"], 4);
    for v in 0..10 {
        fs.record(0, v).unwrap();
    }

    let mut results = serving(&[&fs], || attach(&[9101], &tool_config(dir.path(), 5000)).unwrap());
    let region = results.remove(&9101).unwrap().unwrap();
    let stats = region.stats(0, &mut Vec::new()).unwrap();
    assert_eq!(stats.count, 4);
    assert_eq!(stats.min, 6);
    assert_eq!(stats.max, 9);
    assert_eq!(stats.avg, 7.5);
}

#[test]
fn test_single_sample() {
    let dir = tempfile::tempdir().unwrap();
    let fs = target(dir.path(), 9201, &["one"], 16);
    fs.record(0, 1234).unwrap();

    let mut results = serving(&[&fs], || attach(&[9201], &tool_config(dir.path(), 5000)).unwrap());
    let region = results.remove(&9201).unwrap().unwrap();
    let stats = region.stats(0, &mut Vec::new()).unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.avg, 1234.0);
    assert_eq!(stats.p50, 1234);
    assert_eq!(stats.p99, 1234);
    assert_eq!(stats.stddev, 0.0);
    assert_eq!(stats.iqr, 0);
}

#[test]
fn test_unpolled_target_times_out_then_attaches() {
    let dir = tempfile::tempdir().unwrap();
    let fs = target(dir.path(), 9301, &["idle"], 16);

    let results = attach(&[9301], &tool_config(dir.path(), 100)).unwrap();
    assert!(matches!(results[&9301], Err(AttachError::Timeout(_))));

    // The abandoned connection is served into a closed peer; the target
    // carries on and a fresh attach still works.
    let mut results = serving(&[&fs], || attach(&[9301], &tool_config(dir.path(), 5000)).unwrap());
    assert!(results.remove(&9301).unwrap().is_ok());
}

#[test]
fn test_observer_reads_while_target_records() {
    let dir = tempfile::tempdir().unwrap();
    let fs = target(dir.path(), 9401, &["hot"], 32);

    let mut results = serving(&[&fs], || attach(&[9401], &tool_config(dir.path(), 5000)).unwrap());
    let region = results.remove(&9401).unwrap().unwrap();
    let mut observer = Observer::new([(9401, region)]);

    let stop = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            let mut v = 0u64;
            while !stop.load(Ordering::Relaxed) {
                fs.record(0, v % 1000).unwrap();
                v += 1;
            }
        });
        let mut seen = 0;
        let never = AtomicBool::new(false);
        observer.run(Duration::from_millis(5), 20, &never, |report| {
            assert_eq!(report.name, "hot");
            assert!(report.stats.count <= 32);
            assert!(report.stats.max < 1000);
            assert!(report.stats.min <= report.stats.p50);
            assert!(report.stats.p50 <= report.stats.p99);
            assert!(report.stats.p99 <= report.stats.max);
            seen += 1;
        });
        stop.store(true, Ordering::Relaxed);
        assert_eq!(seen, 20);
    });

    observer.detach().unwrap();
    fs.cleanup().unwrap();
}

/// Set in the child's environment to the socket directory it serves from.
const CHILD_SOCK_DIR: &str = "FUNCSCOPE_TEST_CHILD_SOCK_DIR";
const CHILD_READY: &str = "funcscope-child ready";

/// Child half of `test_attach_to_other_process`: a no-op unless started
/// by it. Records 0..9 on "alpha", then serves attach requests until its
/// stdin closes.
#[test]
fn test_serve_as_child_target() {
    let Some(dir) = std::env::var_os(CHILD_SOCK_DIR) else {
        return;
    };
    let fs = FuncscopeBuilder::with_names(["alpha", "beta"])
        .config(
            TargetConfig::new()
                .hugepages(false)
                .sock_dir(dir)
                .ring_capacity(16)
                .clock(ClockSource::Nanos),
        )
        .build()
        .unwrap();
    for v in 0..10 {
        fs.record(0, v).unwrap();
    }

    let stop = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            let _ = std::io::stdin().read_to_end(&mut Vec::new());
            stop.store(true, Ordering::Relaxed);
        });
        println!("{CHILD_READY}");
        let deadline = Instant::now() + Duration::from_secs(30);
        while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
            fs.poll_every_n(1);
            thread::sleep(Duration::from_millis(1));
        }
    });
    fs.cleanup().unwrap();
}

#[test]
fn test_attach_to_other_process() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(std::env::current_exe().unwrap())
        .args(["test_serve_as_child_target", "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_SOCK_DIR, dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    let pid = child.id() as i32;

    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    let ready = stdout
        .by_ref()
        .lines()
        .map_while(Result::ok)
        .any(|line| line.contains(CHILD_READY));
    assert!(ready, "child exited before serving");

    let mut results = attach(&[pid], &tool_config(dir.path(), 5000)).unwrap();
    let region = results.remove(&pid).unwrap().unwrap();
    assert_eq!(region.name(0).as_deref(), Some("alpha"));
    let stats = region.stats(0, &mut Vec::new()).unwrap();
    assert_eq!(stats.count, 10);
    assert_eq!(stats.min, 0);
    assert_eq!(stats.max, 9);
    assert_eq!(stats.avg, 4.5);
    assert_eq!(stats.p50, 5);
    assert_eq!(stats.p99, 9);

    // Closing stdin lets the child clean up; the mapping outlives it.
    drop(child.stdin.take());
    // Keep reading so the child's harness can finish writing its summary.
    let _ = stdout.read_to_end(&mut Vec::new());
    assert!(child.wait().unwrap().success());
    assert_eq!(region.stats(0, &mut Vec::new()).unwrap().count, 10);
    assert!(!funcscope_core::path::sock_path(dir.path(), pid).exists());
    region.unmap().unwrap();
}
