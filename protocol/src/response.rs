use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One message from the server to the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Stdout(Bytes),
    Stderr(Bytes),
    Done(Report),
}

/// How the job's process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusType {
    Exited,
    Killed,
}

/// Resource usage and exit status of a finished job.
///
/// Times are in seconds and memory in KiB.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub real: f64,
    pub user: f64,
    pub kernel: f64,
    pub max_mem: u64,
    pub waits: u64,
    pub preemptions: u64,
    pub major_page_faults: u64,
    pub minor_page_faults: u64,
    pub input_ops: u64,
    pub output_ops: u64,
    pub timed_out: bool,
    pub status_type: StatusType,
    pub status_value: i32,
}
