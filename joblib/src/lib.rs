mod accounting;
mod actors;
pub mod errors;
mod events;
mod executor;
mod streamer;
pub mod types;

// re-export the runner handle as if it is the job runner itself.
pub use actors::runner::JobRunnerHandle as JobRunner;
pub use events::{Event, Outcome, ResourceUsage, Termination, SIGKILL, SPAWN_FAILURE_STATUS};
pub use executor::{kill_process_group, Executor, LocalExecutor, Process};
pub use streamer::CHUNK_SIZE;
pub use types::{JobSpec, Launcher};
