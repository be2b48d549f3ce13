use crate::config::ServerConfig;
use crate::errors::ProtocolError;
use crate::framing::{FrameAssembler, Inbound};
use crate::validator::{self, Control};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use joblib::{Event, Executor, JobRunner, Outcome, Termination};
use protocol::{Report, Response, StatusType};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::{select, time};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, instrument, warn};

type Sink = SplitSink<WebSocketStream<TcpStream>, Message>;
type Source = SplitStream<WebSocketStream<TcpStream>>;

/// How long to wait for the client to acknowledge a close before dropping the socket.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket close reasons must fit in a single control frame.
const MAX_CLOSE_REASON: usize = 123;

/// Where the connection stands once a job has finished.
enum Flow {
    Idle,
    Closed,
}

/// What woke up the connection while a job was running.
enum Step {
    Job(Option<Event>),
    Client(Result<Option<Vec<u8>>, ProtocolError>),
}

struct Connection {
    sink: Sink,
    source: Source,
    assembler: FrameAssembler,
    config: Arc<ServerConfig>,
    executor: Arc<dyn Executor>,
}

/// Serve one client until it disconnects or breaks the protocol.
#[instrument(skip_all, fields(peer = %peer, connection = %uuid::Uuid::new_v4()))]
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    executor: Arc<dyn Executor>,
) {
    let assembler = FrameAssembler::new(config.max_message_size);
    let ws = match tokio_tungstenite::accept_async_with_config(
        stream,
        Some(assembler.websocket_config()),
    )
    .await
    {
        Ok(ws) => ws,
        Err(err) => {
            warn!("websocket handshake failed: {}", err);
            return;
        }
    };
    info!("client connected");
    let (sink, source) = ws.split();
    let mut connection = Connection {
        sink,
        source,
        assembler,
        config,
        executor,
    };
    match connection.serve().await {
        Ok(()) => info!("client disconnected"),
        Err(err) => connection.close(err).await,
    }
}

impl Connection {
    async fn serve(&mut self) -> Result<(), ProtocolError> {
        loop {
            let frame = match next_frame(&mut self.source, &self.assembler).await? {
                Some(frame) => frame,
                None => return Ok(()),
            };
            let value = validator::decode(&frame)?;
            let job = validator::parse_request(value, &self.config)?;
            let mut runner = JobRunner::spawn(Arc::clone(&self.executor), job);
            debug!(job = %runner.job_id(), "job accepted");
            // an early return drops the runner, which kills the job
            match self.run_job(&mut runner).await? {
                Flow::Idle => continue,
                Flow::Closed => return Ok(()),
            }
        }
    }

    async fn run_job(&mut self, runner: &mut JobRunner) -> Result<Flow, ProtocolError> {
        loop {
            let step = select! {
                event = runner.next_event() => Step::Job(event),
                frame = next_frame(&mut self.source, &self.assembler) => Step::Client(frame),
            };
            match step {
                Step::Job(Some(Event::Stdout(blob))) => {
                    self.send(Response::Stdout(blob)).await?;
                }
                Step::Job(Some(Event::Stderr(blob))) => {
                    self.send(Response::Stderr(blob)).await?;
                }
                Step::Job(Some(Event::Done(outcome))) => {
                    self.send(Response::Done(report(outcome))).await?;
                    return Ok(Flow::Idle);
                }
                Step::Job(None) => {
                    warn!("job ended without reporting");
                    return Ok(Flow::Idle);
                }
                Step::Client(frame) => match frame? {
                    Some(frame) => {
                        let value = validator::decode(&frame)?;
                        match validator::parse_control(&value)? {
                            Control::Kill => runner.kill(),
                        }
                    }
                    None => {
                        info!("client left while a job was running");
                        return Ok(Flow::Closed);
                    }
                },
            }
        }
    }

    async fn send(&mut self, response: Response) -> Result<(), ProtocolError> {
        let frame = protocol::encode_response(&response)?;
        self.sink.send(Message::Binary(frame)).await?;
        Ok(())
    }

    /// Close the connection because of `err`, then wait briefly for the client to go away.
    async fn close(mut self, err: ProtocolError) {
        let code = match err.close_code() {
            Some(code) => code,
            None => {
                debug!("connection lost: {}", err);
                return;
            }
        };
        info!(code, "closing connection: {}", err);
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: truncate(err.to_string(), MAX_CLOSE_REASON).into(),
        };
        if let Err(err) = self.sink.send(Message::Close(Some(frame))).await {
            debug!("failed to send close frame: {}", err);
            return;
        }
        let drain = async {
            while let Some(Ok(_)) = self.source.next().await {}
        };
        let _ = time::timeout(CLOSE_TIMEOUT, drain).await;
    }
}

/// Read until the client sends a complete request frame. `None` means the client is gone.
async fn next_frame(
    source: &mut Source,
    assembler: &FrameAssembler,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    loop {
        match assembler.accept(source.next().await)? {
            Inbound::Frame(frame) => return Ok(Some(frame)),
            Inbound::Ignore => continue,
            Inbound::Closed => return Ok(None),
        }
    }
}

fn truncate(mut reason: String, max: usize) -> String {
    if reason.len() > max {
        let mut end = max;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

pub fn report(outcome: Outcome) -> Report {
    let (status_type, status_value) = match outcome.termination {
        Termination::Exited { code } => (StatusType::Exited, code),
        Termination::Killed { signal } => (StatusType::Killed, signal),
    };
    let usage = outcome.usage;
    Report {
        real: usage.real.as_secs_f64(),
        user: usage.user.as_secs_f64(),
        kernel: usage.kernel.as_secs_f64(),
        max_mem: usage.max_mem,
        waits: usage.voluntary_switches,
        preemptions: usage.involuntary_switches,
        major_page_faults: usage.major_page_faults,
        minor_page_faults: usage.minor_page_faults,
        input_ops: usage.input_ops,
        output_ops: usage.output_ops,
        timed_out: outcome.timed_out,
        status_type,
        status_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joblib::ResourceUsage;

    #[test]
    fn report_maps_usage_and_status() {
        let outcome = Outcome {
            termination: Termination::Killed { signal: 9 },
            usage: ResourceUsage {
                real: Duration::from_millis(1500),
                user: Duration::from_millis(250),
                kernel: Duration::from_millis(125),
                max_mem: 4096,
                voluntary_switches: 3,
                involuntary_switches: 1,
                ..ResourceUsage::default()
            },
            timed_out: true,
        };
        let report = report(outcome);
        assert_eq!(report.real, 1.5);
        assert_eq!(report.user, 0.25);
        assert_eq!(report.kernel, 0.125);
        assert_eq!(report.max_mem, 4096);
        assert_eq!(report.waits, 3);
        assert_eq!(report.preemptions, 1);
        assert_eq!(report.status_type, StatusType::Killed);
        assert_eq!(report.status_value, 9);
        assert!(report.timed_out);
    }

    #[test]
    fn close_reasons_are_truncated_on_char_boundaries() {
        assert_eq!(truncate("short".into(), 123), "short");
        let long = "é".repeat(100);
        let cut = truncate(long, 123);
        assert!(cut.len() <= 123);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
