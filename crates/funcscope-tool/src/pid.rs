//! Process id validation.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// True if `pid` names a live process.
///
/// Probes with signal 0. A process owned by another user answers
/// `EPERM`, which still proves it exists.
pub fn pid_exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

/// Parse a command-line pid, rejecting anything that is not a live
/// process.
pub fn parse_pid(arg: &str) -> Result<i32, String> {
    let pid: i32 = arg
        .trim()
        .parse()
        .map_err(|_| format!("'{arg}' is not a process id"))?;
    if pid <= 0 {
        return Err(format!("'{arg}' is not a process id"));
    }
    if !pid_exists(pid) {
        return Err(format!("no such process: {pid}"));
    }
    Ok(pid)
}
