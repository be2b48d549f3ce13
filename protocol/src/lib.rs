//! Wire types shared by the execution server and its clients.
//!
//! Every frame on the wire is one msgpack value. Clients send a [`JobRequest`] map while the
//! connection is idle and the string [`KILL`] while a job is running; the server answers with a
//! stream of [`Response`] values, the last of which is always [`Response::Done`].

pub mod close;
mod error;
mod request;
mod response;

pub use error::{Error, Result};
pub use request::{JobRequest, KILL};
pub use response::{Report, Response, StatusType};

/// Encode a response the way the server puts it on the wire.
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(response)?)
}

/// Decode one response frame.
pub fn decode_response(frame: &[u8]) -> Result<Response> {
    Ok(rmp_serde::from_slice(frame)?)
}

/// Encode a job request.
pub fn encode_request(request: &JobRequest) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(request)?)
}

/// Encode the control message that asks the server to kill the running job.
pub fn encode_kill() -> Vec<u8> {
    let mut buf = Vec::with_capacity(KILL.len() + 1);
    // writing into a Vec cannot fail
    let _ = rmp::encode::write_str(&mut buf, KILL);
    buf
}
