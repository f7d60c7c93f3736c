//! Supervision of the VICE process under test.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use vice_bm_protocol::wait_for_listener;

use crate::error::SmokeError;
use crate::scenario::Delays;

/// Command line enabling the binary monitor on `addr`, with sound and
/// user configuration disabled and warp mode on.
pub fn vice_args(addr: SocketAddr) -> Vec<OsString> {
    [
        "-binarymonitor".to_string(),
        "-binarymonitoraddress".to_string(),
        addr.to_string(),
        "-sounddev".to_string(),
        "dummy".to_string(),
        "-config".to_string(),
        "/dev/null".to_string(),
        "-warp".to_string(),
    ]
    .into_iter()
    .map(OsString::from)
    .collect()
}

/// A running emulator; terminated when dropped
pub struct EmulatorProcess {
    child: Child,
    grace: Duration,
}

impl EmulatorProcess {
    /// Start `vice_bin` listening on `addr`, with `extra` arguments appended
    pub fn spawn(
        vice_bin: &str,
        addr: SocketAddr,
        extra: &[OsString],
        grace: Duration,
    ) -> Result<Self, SmokeError> {
        let mut command = Command::new(vice_bin);
        command
            .args(vice_args(addr))
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        Self::from_command(command, grace)
            .map_err(|e| SmokeError::Process(format!("cannot start {}: {}", vice_bin, e)))
    }

    pub fn from_command(mut command: Command, grace: Duration) -> std::io::Result<Self> {
        let child = command.spawn()?;
        debug!("started {:?} as pid {}", command.get_program(), child.id());
        Ok(EmulatorProcess { child, grace })
    }

    /// Block until the monitor port accepts connections
    pub fn wait_until_listening(
        &mut self,
        addr: SocketAddr,
        delays: &Delays,
    ) -> Result<(), SmokeError> {
        if wait_for_listener(
            addr,
            delays.port_timeout,
            delays.port_probe,
            delays.port_retry,
        ) {
            return Ok(());
        }
        let detail = match self.child.try_wait() {
            Ok(Some(status)) => format!("emulator exited early ({})", status),
            _ => format!("port still closed after {:?}", delays.port_timeout),
        };
        Err(SmokeError::Process(format!(
            "timeout waiting for binary monitor at {}: {}",
            addr, detail
        )))
    }

    /// Ask the process to exit, killing it if it outlives the grace period
    pub fn terminate(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }

        let deadline = if request_exit(&self.child) {
            Instant::now() + self.grace
        } else {
            Instant::now()
        };
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait()? {
                debug!("pid {} exited: {}", self.child.id(), status);
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        warn!("pid {} ignored termination, killing it", self.child.id());
        self.child.kill()?;
        self.child.wait()
    }
}

/// Send SIGTERM; false when no signal was delivered and only the
/// forceful path is left
#[cfg(unix)]
fn request_exit(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        warn!("pid {} out of range for kill(2)", child.id());
        return false;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(errno) => {
            warn!("could not send SIGTERM to pid {}: {}", child.id(), errno);
            false
        }
    }
}

#[cfg(not(unix))]
fn request_exit(_child: &Child) -> bool {
    false
}

impl Drop for EmulatorProcess {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("failed to stop pid {}: {}", self.child.id(), e);
        }
    }
}
