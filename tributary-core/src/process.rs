//! Handle over a running connector process.

use std::io;
use std::process::ExitStatus;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tokio::process::Child;
use tracing::warn;

/// Lifecycle control over a launched connector.
///
/// All methods take `&self` so the handle can be shared between the sync loop and
/// a cancellation task.
pub trait ConnectorProcess: Send + Sync {
    /// OS process id, if known
    fn pid(&self) -> Option<u32>;

    /// Whether the process is still running
    fn is_alive(&self) -> bool;

    /// Exit code once the process has exited, `None` while it is running.
    ///
    /// Processes killed by a signal report `128 + signal`.
    fn exit_code(&self) -> Option<i32>;

    /// Politely ask the process to stop (SIGTERM on unix)
    fn terminate(&self) -> io::Result<()>;

    /// Forcefully stop the process
    fn kill(&self) -> io::Result<()>;
}

/// [`ConnectorProcess`] backed by a tokio child process
pub struct LocalConnectorProcess {
    child: Mutex<Child>,
    pid: Option<u32>,
    status: OnceLock<ExitStatus>,
}

impl LocalConnectorProcess {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Mutex::new(child),
            pid,
            status: OnceLock::new(),
        }
    }

    fn lock_child(&self) -> MutexGuard<'_, Child> {
        match self.child.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Poll the child without blocking, caching the status once it has exited
    fn poll_status(&self, child: &mut Child) -> Option<ExitStatus> {
        if let Some(status) = self.status.get() {
            return Some(*status);
        }

        match child.try_wait() {
            Ok(Some(status)) => Some(*self.status.get_or_init(|| status)),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to query destination process status: {}", e);
                None
            }
        }
    }

    fn status(&self) -> Option<ExitStatus> {
        if let Some(status) = self.status.get() {
            return Some(*status);
        }
        let mut child = self.lock_child();
        self.poll_status(&mut child)
    }
}

impl ConnectorProcess for LocalConnectorProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&self) -> bool {
        self.status().is_none()
    }

    fn exit_code(&self) -> Option<i32> {
        self.status().map(exit_code_of)
    }

    #[cfg(unix)]
    fn terminate(&self) -> io::Result<()> {
        // Held across the signal so the pid cannot be reaped and reused underneath us
        let mut child = self.lock_child();
        if self.poll_status(&mut child).is_some() {
            return Ok(());
        }
        let Some(pid) = self.pid else {
            return Ok(());
        };

        // SAFETY: kill(2) has no memory-safety preconditions
        let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if ret == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(())
        } else {
            Err(err)
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> io::Result<()> {
        self.kill()
    }

    fn kill(&self) -> io::Result<()> {
        let mut child = self.lock_child();
        if self.poll_status(&mut child).is_some() {
            return Ok(());
        }

        match child.start_kill() {
            Ok(()) => Ok(()),
            // Exited between the poll and the kill
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Exit code following the shell convention for signal deaths
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    fn spawn(script: &str) -> LocalConnectorProcess {
        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        LocalConnectorProcess::new(child)
    }

    async fn wait_exit(process: &LocalConnectorProcess) -> i32 {
        for _ in 0..200 {
            if let Some(code) = process.exit_code() {
                return code;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("process did not exit");
    }

    #[tokio::test]
    async fn test_exit_code_is_captured() {
        let process = spawn("exit 3");
        assert_eq!(wait_exit(&process).await, 3);
        assert!(!process.is_alive());
        assert_eq!(process.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn test_terminate_reports_143() {
        let process = spawn("exec sleep 30");
        assert!(process.is_alive());
        assert!(process.pid().is_some());

        process.terminate().unwrap();
        assert_eq!(wait_exit(&process).await, 143);
    }

    #[tokio::test]
    async fn test_kill_reports_137() {
        let process = spawn("exec sleep 30");
        process.kill().unwrap();
        assert_eq!(wait_exit(&process).await, 137);
    }

    #[tokio::test]
    async fn test_signals_after_exit_are_noops() {
        let process = spawn("exit 0");
        assert_eq!(wait_exit(&process).await, 0);

        process.terminate().unwrap();
        process.kill().unwrap();
        assert_eq!(process.exit_code(), Some(0));
    }
}
