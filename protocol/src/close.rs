//! Close codes the server uses to reject a connection.
//!
//! Protocol errors are never reported as a response; the server closes the transport with one
//! of these codes and a human readable reason instead.

/// The payload was not a binary frame.
pub const UNSUPPORTED_DATA: u16 = 1003;

/// The request was malformed or failed validation.
pub const POLICY_VIOLATION: u16 = 1008;

/// The request exceeded the message size limit.
pub const TOO_LARGE: u16 = 1009;

/// Prefix of every policy violation reason.
pub const INVALID_REQUEST_PREFIX: &str = "invalid request: ";
