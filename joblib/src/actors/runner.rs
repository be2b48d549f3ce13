mod actor;
mod messages;

use crate::events::Event;
use crate::executor::Executor;
use crate::types::{JobId, JobSpec};
use actor::Actor;
use messages::RunnerMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info_span;

/// Capacity of the event queue between a job and whoever consumes its events.
///
/// A consumer that falls behind stalls the output pumps, which in turn stalls the child once
/// its pipes fill up.
const EVENT_CAPACITY: usize = 32;

/// Runs a single job and streams its events.
///
/// This struct is actually an actor handle. The process is owned by the actor spawned in
/// `JobRunnerHandle::spawn`, which races the process's exit against the job's timeout and
/// against kill requests sent through this handle. Dropping the handle kills the job.
pub struct JobRunnerHandle {
    job_id: JobId,
    sender: mpsc::UnboundedSender<RunnerMessage>,
    events: mpsc::Receiver<Event>,
}

impl JobRunnerHandle {
    /// Start `job` with `executor`. The executor runs on the blocking thread pool.
    ///
    /// Never fails: if the process cannot be started, the failure is reported through the
    /// job's events, which still end with [`Event::Done`].
    pub fn spawn(executor: Arc<dyn Executor>, job: JobSpec) -> Self {
        let job_id = uuid::Uuid::new_v4();
        let (sender, inbox) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::channel(EVENT_CAPACITY);
        let span = info_span!("job", id = %job_id);
        Actor::spawn(inbox, events_tx, executor, job, span);
        Self {
            job_id,
            sender,
            events,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Ask the runner to kill the job. The job still finishes with [`Event::Done`].
    pub fn kill(&self) {
        let _ = self.sender.send(RunnerMessage::Kill);
    }

    /// The job's next event; `None` once [`Event::Done`] has been delivered.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}
