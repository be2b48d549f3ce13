use super::messages::RunnerMessage;
use crate::accounting;
use crate::errors::JobError;
use crate::events::{Event, Outcome, ResourceUsage, Termination, SIGKILL, SPAWN_FAILURE_STATUS};
use crate::executor::{kill_process_group, Executor, Process};
use crate::streamer;
use crate::types::JobSpec;

use futures::future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::{select, sync::mpsc, task, time};
use tracing::{info, warn, Instrument, Span};

/// How long output may keep arriving after the job has been killed.
const KILLED_DRAIN: Duration = Duration::from_millis(100);

/// Kills the job's process group if the actor is dropped before the job is reaped, which
/// happens when the runtime shuts down under a running job.
struct GroupGuard {
    pid: libc::pid_t,
    armed: bool,
}

impl GroupGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.armed {
            kill_process_group(self.pid);
        }
    }
}

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<RunnerMessage>,
    events: mpsc::Sender<Event>,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::UnboundedReceiver<RunnerMessage>,
        events: mpsc::Sender<Event>,
        executor: Arc<dyn Executor>,
        job: JobSpec,
        span: Span,
    ) {
        let actor = Self { inbox, events };
        tokio::spawn(
            async move {
                // preparing the workdir and forking both block
                let current = Span::current();
                let spawned = task::spawn_blocking(move || {
                    let process = current.in_scope(|| executor.spawn(&job));
                    (process, job)
                })
                .await;
                match spawned {
                    Ok((Ok(process), job)) => actor.run(process, job).await,
                    Ok((Err(err), _)) => actor.report_spawn_failure(err).await,
                    Err(err) => actor.report_spawn_failure(JobError::from(err)).await,
                }
            }
            .instrument(span),
        );
    }

    async fn run(mut self, process: Process, job: JobSpec) {
        let Process {
            pid,
            stdin,
            stdout,
            stderr,
            started,
            workdir,
        } = process;
        let mut guard = GroupGuard { pid, armed: true };
        info!(pid, timeout = ?job.timeout, "job started");

        let feeder = tokio::spawn(streamer::feed(stdin, job.input));
        let stdout_pump = tokio::spawn(streamer::pump(stdout, Event::Stdout, self.events.clone()));
        let stderr_pump = tokio::spawn(streamer::pump(stderr, Event::Stderr, self.events.clone()));
        let pump_aborts = [stdout_pump.abort_handle(), stderr_pump.abort_handle()];

        // exit, timeout and kill race; whichever comes first decides how the job ends
        let mut exit = task::spawn_blocking(move || accounting::wait_for_exit(pid));
        let timer = time::sleep(job.timeout);
        tokio::pin!(timer);
        let mut killed = false;
        let mut timed_out = false;
        let exited = loop {
            select! {
                biased;
                result = &mut exit => break result,
                _ = &mut timer, if !killed => {
                    info!("job timed out");
                    killed = true;
                    timed_out = true;
                    kill_process_group(pid);
                }
                msg = self.inbox.recv(), if !killed => {
                    match msg {
                        Some(RunnerMessage::Kill) => info!("kill requested"),
                        // actor handle dropped, make sure we kill the child process before we exit
                        None => info!("runner handle dropped"),
                    }
                    killed = true;
                    kill_process_group(pid);
                }
            }
        };
        let real = started.elapsed();
        let observed = match exited {
            Ok(Ok(termination)) => Some(termination),
            Ok(Err(err)) => {
                warn!("failed to wait for job exit: {}", err);
                None
            }
            Err(err) => {
                warn!("exit waiter failed: {}", err);
                None
            }
        };

        // nothing started by the job outlives it
        kill_process_group(pid);
        let reaped = task::spawn_blocking(move || accounting::reap(pid))
            .await
            .unwrap_or_else(|err| Err(io::Error::new(io::ErrorKind::Other, err)));
        guard.disarm();
        drop(workdir);
        feeder.abort();

        // A descendant that left the process group can keep the pipes open. The job's
        // deadline and kill requests still bound how long its output is collected.
        let deadline = if killed {
            Instant::now() + KILLED_DRAIN
        } else {
            timer.deadline()
        };
        let pumps = future::join(stdout_pump, stderr_pump);
        tokio::pin!(pumps);
        let drained = select! {
            biased;
            _ = &mut pumps => true,
            _ = time::sleep_until(deadline) => {
                if !killed {
                    info!("job timed out with its output still open");
                    timed_out = true;
                }
                false
            }
            msg = self.inbox.recv(), if !killed => {
                match msg {
                    Some(RunnerMessage::Kill) => info!("kill requested with output still open"),
                    None => info!("runner handle dropped with output still open"),
                }
                false
            }
        };
        if !drained {
            // dropping the pumps closes the read ends; wait so no output follows Done
            for abort in &pump_aborts {
                abort.abort();
            }
            let _ = pumps.await;
        }

        let fallback = observed.unwrap_or(if killed {
            Termination::Killed { signal: SIGKILL }
        } else {
            Termination::Exited { code: 0 }
        });
        let outcome = accounting::outcome(reaped, real, fallback, timed_out);
        info!(termination = ?outcome.termination, timed_out, "job finished");
        let _ = self.events.send(Event::Done(outcome)).await;
    }

    async fn report_spawn_failure(self, err: JobError) {
        warn!("failed to start job: {}", err);
        let message = format!("{}\n", err);
        let _ = self.events.send(Event::Stderr(message.into())).await;
        let outcome = Outcome {
            termination: Termination::Exited {
                code: SPAWN_FAILURE_STATUS,
            },
            usage: ResourceUsage::default(),
            timed_out: false,
        };
        let _ = self.events.send(Event::Done(outcome)).await;
    }
}
