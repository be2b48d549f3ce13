pub enum RunnerMessage {
    /// Terminate the job's process group. Ignored once the job is already being terminated.
    Kill,
}
