use crate::types::OutputBlob;
use std::time::Duration;

/// Signal number reported for a process tree terminated by the runner.
pub const SIGKILL: i32 = 9;

/// Exit status reported for a job whose process could not be started.
pub const SPAWN_FAILURE_STATUS: i32 = 127;

/// How a job's process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    Exited { code: i32 },
    Killed { signal: i32 },
}

/// Resource usage of a reaped process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub real: Duration,
    pub user: Duration,
    pub kernel: Duration,
    /// Peak resident set size, in KiB.
    pub max_mem: u64,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
    pub major_page_faults: u64,
    pub minor_page_faults: u64,
    pub input_ops: u64,
    pub output_ops: u64,
}

/// Everything known about a job once it has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub termination: Termination,
    pub usage: ResourceUsage,
    pub timed_out: bool,
}

#[derive(Clone, Debug)]
pub enum Event {
    Stdout(OutputBlob),
    Stderr(OutputBlob),
    /// Always the last event of a job.
    Done(Outcome),
}
