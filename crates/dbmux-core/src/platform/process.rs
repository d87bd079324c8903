//! Platform-specific process liveness and termination.
//!
//! Registry entries are considered live only while their owning process
//! exists, so every liveness decision in the crate goes through
//! [`is_process_alive`].

use crate::error::{DbmuxError, Result};
use tracing::{debug, warn};

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: `kill(pid, 0)`; `EPERM` still means the process exists
/// - **Windows**: `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`
///
/// PID 0 and PIDs that do not fit the platform's signed PID type are never
/// alive (they would address process groups on Unix).
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        windows_process_exists(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        true
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn windows_process_exists(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    // SAFETY: OpenProcess has no pointer arguments; a non-null handle is owned
    // here and closed exactly once before returning.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            false
        } else {
            CloseHandle(handle);
            true
        }
    }
}

/// Terminate a process gracefully, then forcefully if needed.
///
/// # Platform Behavior
/// - **Linux/macOS**: Sends SIGTERM, waits up to `timeout_ms`, then SIGKILL
/// - **Windows**: Uses `taskkill /PID {pid} /F`
///
/// Returns `true` if the process is gone afterwards (or was never running).
pub fn terminate_process(pid: u32, timeout_ms: u64) -> Result<bool> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(true);
    }

    #[cfg(unix)]
    {
        terminate_process_unix(pid, timeout_ms)
    }

    #[cfg(windows)]
    {
        let _ = timeout_ms;
        terminate_process_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = timeout_ms;
        Err(DbmuxError::Other(
            "Process termination not implemented for this platform".into(),
        ))
    }
}

#[cfg(unix)]
fn terminate_process_unix(pid: u32, timeout_ms: u64) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;
    use std::thread::sleep;
    use std::time::Duration;

    let raw = i32::try_from(pid)
        .map_err(|_| DbmuxError::Other(format!("PID {} out of range", pid)))?;
    let nix_pid = Pid::from_raw(raw);

    debug!("Sending SIGTERM to process {}", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
        if e == Errno::ESRCH {
            return Ok(true);
        }
        warn!("Failed to send SIGTERM to {}: {}", pid, e);
    }

    let wait_interval = Duration::from_millis(100);
    let iterations = (timeout_ms / 100).max(1);

    for _ in 0..iterations {
        sleep(wait_interval);
        // Reap if it was our child; ECHILD otherwise, which is fine
        let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
        if !is_process_alive(pid) {
            debug!("Process {} terminated gracefully", pid);
            return Ok(true);
        }
    }

    debug!("Process {} still running, sending SIGKILL", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGKILL) {
        if e == Errno::ESRCH {
            return Ok(true);
        }
        return Err(DbmuxError::Other(format!(
            "Failed to kill process {}: {}",
            pid, e
        )));
    }

    sleep(Duration::from_millis(100));
    let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));

    Ok(!is_process_alive(pid))
}

#[cfg(windows)]
fn terminate_process_windows(pid: u32) -> Result<bool> {
    use std::process::Command;

    debug!("Terminating process {} with taskkill", pid);

    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .output()
        .map_err(|e| DbmuxError::Other(format!("Failed to run taskkill: {}", e)))?;

    if output.status.success() {
        Ok(true)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not found") || stderr.contains("not running") {
            Ok(true)
        } else {
            warn!("taskkill failed for {}: {}", pid, stderr);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(999_999_999));
        assert!(!is_process_alive(4_000_000_000));
    }

    #[test]
    fn test_pid_zero_is_never_alive() {
        assert!(!is_process_alive(0));
    }

    #[test]
    fn test_terminate_nonexistent() {
        let result = terminate_process(999_999_999, 100);
        assert!(result.unwrap());
    }
}
