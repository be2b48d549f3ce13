//! Exit observation and resource accounting for job processes.
//!
//! A job's exit is observed in two steps. [`wait_for_exit`] blocks until the process has exited
//! but leaves it a zombie, so its pid (and with it the process group id) cannot be recycled
//! while the runner signals whatever is left of the group. [`reap`] then collects the exit
//! status together with the kernel's rusage for the process.

use crate::events::{Outcome, ResourceUsage, Termination};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;
use nix::errno::Errno;
use nix::sys::wait::{waitid, Id, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::{io, mem};
use tracing::{debug, warn};

/// Block until `pid` has exited, without reaping it, and report how it ended.
pub(crate) fn wait_for_exit(pid: libc::pid_t) -> io::Result<Termination> {
    loop {
        match waitid(Id::Pid(Pid::from_raw(pid)), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(Termination::Exited { code }),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Ok(Termination::Killed { signal: signal as i32 });
            }
            // only exits are waited for; anything else is not an exit yet
            Ok(status) => debug!("ignoring wait status {:?}", status),
            Err(Errno::EINTR) => {}
            Err(errno) => return Err(io::Error::from(errno)),
        }
    }
}

/// Reap `pid`, returning how it ended and what it used.
pub(crate) fn reap(pid: libc::pid_t) -> io::Result<(Termination, libc::rusage)> {
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: rusage is plain data, and wait4 only writes into it.
        let mut usage: libc::rusage = unsafe { mem::zeroed() };
        let rc = unsafe { libc::wait4(pid, &mut status, 0, &mut usage) };
        if rc == pid {
            return Ok((termination(ExitStatus::from_raw(status)), usage));
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn termination(status: ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        Termination::Exited { code }
    } else if let Some(signal) = status.signal() {
        Termination::Killed { signal }
    } else {
        // stopped or continued; wait4 without WUNTRACED never reports these
        Termination::Exited { code: 0 }
    }
}

fn duration(time: libc::timeval) -> Duration {
    let secs = u64::try_from(time.tv_sec).unwrap_or(0);
    let micros = u32::try_from(time.tv_usec).unwrap_or(0).min(999_999);
    Duration::new(secs, micros * 1_000)
}

fn count(value: libc::c_long) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Convert a kernel rusage into the job's [`ResourceUsage`].
///
/// `real` is wall time the runner measured itself; the kernel does not track it per process.
pub(crate) fn usage(real: Duration, rusage: &libc::rusage) -> ResourceUsage {
    ResourceUsage {
        real,
        user: duration(rusage.ru_utime),
        kernel: duration(rusage.ru_stime),
        // already KiB on Linux
        max_mem: count(rusage.ru_maxrss),
        voluntary_switches: count(rusage.ru_nvcsw),
        involuntary_switches: count(rusage.ru_nivcsw),
        major_page_faults: count(rusage.ru_majflt),
        minor_page_faults: count(rusage.ru_minflt),
        input_ops: count(rusage.ru_inblock),
        output_ops: count(rusage.ru_oublock),
    }
}

/// Build the outcome of a job from the result of reaping it.
///
/// A failed reap degrades to zeroed usage and the `observed` status, usually what
/// [`wait_for_exit`] saw; it never prevents the job from reporting.
pub(crate) fn outcome(
    reaped: io::Result<(Termination, libc::rusage)>,
    real: Duration,
    observed: Termination,
    timed_out: bool,
) -> Outcome {
    match reaped {
        Ok((termination, rusage)) => Outcome {
            termination,
            usage: usage(real, &rusage),
            timed_out,
        },
        Err(err) => {
            warn!("failed to collect exit status and resource usage: {}", err);
            Outcome {
                termination: observed,
                usage: ResourceUsage {
                    real,
                    ..ResourceUsage::default()
                },
                timed_out,
            }
        }
    }
}
