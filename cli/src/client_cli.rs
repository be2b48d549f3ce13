use futures::{SinkExt, StreamExt};
use protocol::{JobRequest, Report, Response, StatusType};
use thiserror::Error;
use tokio::io::{self, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("bad message from server: {0}")]
    Protocol(#[from] protocol::Error),
    #[error("server closed the connection ({code}): {reason}")]
    Closed { code: u16, reason: String },
    #[error("connection ended before the job finished")]
    Ended,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct ClientCli {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ClientCli {
    pub async fn connect(server: &str) -> Result<Self, ClientError> {
        let (inner, _) = tokio_tungstenite::connect_async(server).await?;
        Ok(Self { inner })
    }

    /// Run one job, copying its output to our stdout and stderr as it arrives.
    ///
    /// The first Ctrl-C asks the server to kill the job; the report still follows.
    pub async fn run(&mut self, request: &JobRequest) -> Result<Report, ClientError> {
        let frame = protocol::encode_request(request)?;
        self.inner.send(Message::Binary(frame)).await?;

        let mut stdout = io::stdout();
        let mut stderr = io::stderr();
        let mut kill_sent = false;
        loop {
            let message = tokio::select! {
                message = self.inner.next() => message,
                _ = tokio::signal::ctrl_c(), if !kill_sent => {
                    kill_sent = true;
                    self.inner.send(Message::Binary(protocol::encode_kill())).await?;
                    continue;
                }
            };
            match message.ok_or(ClientError::Ended)?? {
                Message::Binary(frame) => match protocol::decode_response(&frame)? {
                    Response::Stdout(data) => {
                        stdout.write_all(&data).await?;
                        stdout.flush().await?;
                    }
                    Response::Stderr(data) => {
                        stderr.write_all(&data).await?;
                        stderr.flush().await?;
                    }
                    Response::Done(report) => return Ok(report),
                },
                Message::Close(Some(frame)) => {
                    return Err(ClientError::Closed {
                        code: frame.code.into(),
                        reason: frame.reason.into_owned(),
                    })
                }
                Message::Close(None) => return Err(ClientError::Ended),
                _ => {}
            }
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.inner.close(None).await?;
        Ok(())
    }
}

/// One line summary of a finished job.
pub fn describe(report: &Report) -> String {
    let status = match report.status_type {
        StatusType::Exited => format!("exited with code {}", report.status_value),
        StatusType::Killed => format!("killed by signal {}", report.status_value),
    };
    let timed_out = if report.timed_out { " (timed out)" } else { "" };
    format!(
        "{}{}; real {:.3}s user {:.3}s kernel {:.3}s; max memory {} KiB",
        status, timed_out, report.real, report.user, report.kernel, report.max_mem
    )
}

/// Shell convention: the exit code, or 128 plus the signal that killed the job.
pub fn exit_code(report: &Report) -> i32 {
    match report.status_type {
        StatusType::Exited => report.status_value,
        StatusType::Killed => 128 + report.status_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status_type: StatusType, status_value: i32, timed_out: bool) -> Report {
        Report {
            real: 1.0,
            user: 0.25,
            kernel: 0.125,
            max_mem: 2048,
            waits: 0,
            preemptions: 0,
            major_page_faults: 0,
            minor_page_faults: 0,
            input_ops: 0,
            output_ops: 0,
            timed_out,
            status_type,
            status_value,
        }
    }

    #[test]
    fn exit_codes_follow_the_shell() {
        assert_eq!(exit_code(&report(StatusType::Exited, 3, false)), 3);
        assert_eq!(exit_code(&report(StatusType::Killed, 9, true)), 137);
    }

    #[test]
    fn describes_reports() {
        assert_eq!(
            describe(&report(StatusType::Killed, 9, true)),
            "killed by signal 9 (timed out); real 1.000s user 0.250s kernel 0.125s; max memory 2048 KiB"
        );
        assert!(describe(&report(StatusType::Exited, 0, false)).starts_with("exited with code 0;"));
    }
}
