use std::{io, result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("launcher template is empty")]
    EmptyLauncher,
    #[error("launcher program cannot be the placeholder {0}")]
    PlaceholderProgram(String),
    #[error("failed to prepare job directory: {0}")]
    Workdir(#[source] io::Error),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to attach to child pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("executor task failed: {0}")]
    Executor(#[from] tokio::task::JoinError),
}

pub type Result<T> = result::Result<T, JobError>;
