//! Process-group termination with signal escalation.
//!
//! Every command the runner spawns leads its own process group, so one
//! signal reaches the command and anything it forked. Termination sends
//! SIGTERM to the group, waits a grace period for the leader to exit, then
//! escalates to SIGKILL.

use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::HarnessError;

/// Configuration for terminating a process group.
#[derive(Debug, Clone)]
pub struct TerminateConfig {
    /// Grace period between SIGTERM and SIGKILL escalation.
    pub grace_period: Duration,
    /// Polling interval while waiting for the leader to exit.
    pub poll_interval: Duration,
}

impl Default for TerminateConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Send a signal to a process group, treating ESRCH as "already gone".
///
/// Returns `Ok(true)` if the signal was delivered.
fn signal_group(pgid: i32, sig: Signal) -> Result<bool, HarnessError> {
    if pgid <= 1 {
        warn!(pgid, "terminate: refusing to signal protected process group");
        return Err(HarnessError::Signal(nix::errno::Errno::EINVAL));
    }
    match signal::killpg(Pid::from_raw(pgid), sig) {
        Ok(()) => {
            debug!(pgid, signal = ?sig, "terminate: signal sent");
            Ok(true)
        }
        Err(nix::errno::Errno::ESRCH) => {
            debug!(pgid, signal = ?sig, "terminate: group already gone (ESRCH)");
            Ok(false)
        }
        Err(e) => Err(HarnessError::Signal(e)),
    }
}

/// SIGKILL whatever is left in the process group of an already reaped
/// `child`. A group with no members left is not an error.
pub fn kill_remnants(child: &Child) -> Result<(), HarnessError> {
    signal_group(child.id() as i32, Signal::SIGKILL).map(drop)
}

/// Terminate `child` and its process group, then reap it.
///
/// The child must have been spawned as the leader of its own process group.
/// Survivors of SIGTERM past the grace period get SIGKILL; the group is
/// SIGKILLed once more after the leader exits so stray descendants holding
/// the output pipes do not outlive the run.
pub fn terminate_group(child: &mut Child, config: &TerminateConfig) -> Result<ExitStatus, HarnessError> {
    let pgid = child.id() as i32;

    if let Some(status) = child.try_wait()? {
        let _ = signal_group(pgid, Signal::SIGKILL)?;
        return Ok(status);
    }

    info!(pgid, "terminate: sending SIGTERM to process group");
    signal_group(pgid, Signal::SIGTERM)?;

    let deadline = Instant::now() + config.grace_period;
    loop {
        if let Some(status) = child.try_wait()? {
            debug!(pgid, ?status, "terminate: leader exited after SIGTERM");
            let _ = signal_group(pgid, Signal::SIGKILL)?;
            return Ok(status);
        }
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(config.poll_interval);
    }

    warn!(pgid, "terminate: grace period expired, escalating to SIGKILL");
    signal_group(pgid, Signal::SIGKILL)?;
    Ok(child.wait()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::Command;

    fn spawn_group_leader(script: &str) -> Child {
        Command::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .process_group(0)
            .spawn()
            .expect("failed to spawn child")
    }

    fn quick() -> TerminateConfig {
        TerminateConfig {
            grace_period: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn sigterm_stops_cooperative_child() {
        let mut child = spawn_group_leader("sleep 300");
        std::thread::sleep(Duration::from_millis(100));

        let status = terminate_group(&mut child, &quick()).expect("terminate failed");
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[test]
    fn sigkill_after_grace_when_term_ignored() {
        let mut child = spawn_group_leader("trap '' TERM; while true; do sleep 1; done");
        std::thread::sleep(Duration::from_millis(200));

        let started = Instant::now();
        let status = terminate_group(&mut child, &quick()).expect("terminate failed");
        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn already_exited_child_is_reaped() {
        let mut child = spawn_group_leader("exit 3");
        std::thread::sleep(Duration::from_millis(200));

        let status = terminate_group(&mut child, &quick()).expect("terminate failed");
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn remnants_of_exited_leader_are_killed() {
        let mut child = spawn_group_leader("sleep 300 & exit 0");
        let status = child.wait().expect("wait failed");
        assert_eq!(status.code(), Some(0));

        kill_remnants(&child).expect("kill failed");
        // Nothing left to signal is still fine.
        let mut leader = spawn_group_leader("exit 0");
        leader.wait().expect("wait failed");
        std::thread::sleep(Duration::from_millis(50));
        kill_remnants(&leader).expect("empty group");
    }

    #[test]
    fn refuses_init_group() {
        assert!(signal_group(1, Signal::SIGTERM).is_err());
        assert!(signal_group(0, Signal::SIGTERM).is_err());
    }
}
