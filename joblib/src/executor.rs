use crate::errors::{JobError, Result};
use crate::types::JobSpec;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::time::Instant;
use tempfile::TempDir;
use tokio::net::unix::pipe;
use tracing::{debug, warn};

/// Name of the file the job's code is written to inside its working directory.
pub const CODE_FILE: &str = "code";

/// Starts job processes.
///
/// Implementations decide how the process is contained. Whatever they do, the returned
/// process must lead its own process group, because the runner terminates a job by signalling
/// that group.
pub trait Executor: Send + Sync {
    fn spawn(&self, job: &JobSpec) -> Result<Process>;
}

/// A started job process and the pipes attached to it.
pub struct Process {
    /// Also the id of the process group the job runs in.
    pub pid: libc::pid_t,
    pub stdin: pipe::Sender,
    pub stdout: pipe::Receiver,
    pub stderr: pipe::Receiver,
    pub started: Instant,
    /// Dropped once the process has been reaped.
    pub workdir: Option<TempDir>,
}

/// SIGKILL every process in the process group `pgid`.
///
/// Signalling a group that no longer exists is not an error.
pub fn kill_process_group(pgid: libc::pid_t) {
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => debug!("sent SIGKILL to process group {}", pgid),
        Err(Errno::ESRCH) => debug!("process group {} already gone", pgid),
        Err(err) => warn!("failed to kill process group {}: {}", pgid, err),
    }
}

/// Runs jobs as plain child processes of the server.
///
/// The code is written to a fresh temporary directory, which is also the process's working
/// directory. No isolation is applied beyond a dedicated process group.
#[derive(Clone, Debug, Default)]
pub struct LocalExecutor;

impl Executor for LocalExecutor {
    fn spawn(&self, job: &JobSpec) -> Result<Process> {
        let workdir = tempfile::Builder::new()
            .prefix("job-")
            .tempdir()
            .map_err(JobError::Workdir)?;
        let code_path = workdir.path().join(CODE_FILE);
        std::fs::write(&code_path, job.code.as_bytes()).map_err(JobError::Workdir)?;

        let program = job.launcher.program();
        let args = job.launcher.expand(&code_path, &job.options, &job.arguments);
        let started = Instant::now();
        let mut child = Command::new(program)
            .args(&args)
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|source| JobError::Spawn {
                program: program.to_string(),
                source,
            })?;
        let pid = child.id() as libc::pid_t;
        debug!("spawned {} with pid {}", program, pid);

        // The child is reaped by pid, never through `child`, so it is fine to drop it.
        let process = (|| {
            let stdin = child.stdin.take().map(OwnedFd::from).map(File::from);
            let stdout = child.stdout.take().map(OwnedFd::from).map(File::from);
            let stderr = child.stderr.take().map(OwnedFd::from).map(File::from);
            let missing = || std::io::Error::from(std::io::ErrorKind::BrokenPipe);
            Ok::<_, std::io::Error>(Process {
                pid,
                stdin: pipe::Sender::from_file(stdin.ok_or_else(missing)?)?,
                stdout: pipe::Receiver::from_file(stdout.ok_or_else(missing)?)?,
                stderr: pipe::Receiver::from_file(stderr.ok_or_else(missing)?)?,
                started,
                workdir: Some(workdir),
            })
        })();

        process.map_err(|err| {
            // don't leave an unsupervised child behind
            kill_process_group(pid);
            let _ = crate::accounting::reap(pid);
            JobError::Pipe(err)
        })
    }
}
