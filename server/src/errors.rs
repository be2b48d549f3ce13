use protocol::close;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Why a request was rejected. Rendered after the `invalid request: ` prefix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("{0}")]
    Decode(String),
    #[error("found extra data")]
    ExtraData,
    #[error("expected a map, found {0}")]
    NotAMap(&'static str),
    #[error("field names must be strings, found {0}")]
    FieldName(&'static str),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("duplicate field: {0}")]
    DuplicateField(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid type for {field}: expected {expected}, found {found}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid byte in input: {0}")]
    InvalidByte(String),
    #[error("no such language: {0}")]
    NoSuchLanguage(String),
    #[error("timeout not in range 1-{max}: {value}")]
    TimeoutOutOfRange { value: String, max: i64 },
    #[error("argument contains null byte")]
    NullByte,
    #[error("expected \"Kill\" while a job is running")]
    ExpectedKill,
}

/// A fault that ends the connection.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("expected a binary message")]
    NotBinary,
    #[error("received message of size {size}, greater than size limit {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),
    #[error("failed to encode response: {0}")]
    Encode(#[from] protocol::Error),
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

impl ProtocolError {
    /// The close code to send, or `None` when the transport is already unusable.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            ProtocolError::NotBinary => Some(close::UNSUPPORTED_DATA),
            ProtocolError::TooLarge { .. } => Some(close::TOO_LARGE),
            ProtocolError::InvalidRequest(_) => Some(close::POLICY_VIOLATION),
            ProtocolError::Encode(_) | ProtocolError::Transport(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_match_the_wire_contract() {
        assert_eq!(ProtocolError::NotBinary.to_string(), "expected a binary message");
        assert_eq!(
            ProtocolError::TooLarge {
                size: 65537,
                limit: 65536
            }
            .to_string(),
            "received message of size 65537, greater than size limit 65536"
        );
        let out_of_range = RequestError::TimeoutOutOfRange {
            value: "-4".into(),
            max: 60,
        };
        assert_eq!(
            ProtocolError::from(out_of_range).to_string(),
            "invalid request: timeout not in range 1-60: -4"
        );
        assert_eq!(
            ProtocolError::from(RequestError::NullByte).to_string(),
            "invalid request: argument contains null byte"
        );
    }

    #[test]
    fn close_codes() {
        assert_eq!(ProtocolError::NotBinary.close_code(), Some(1003));
        assert_eq!(
            ProtocolError::TooLarge { size: 2, limit: 1 }.close_code(),
            Some(1009)
        );
        assert_eq!(
            ProtocolError::from(RequestError::ExtraData).close_code(),
            Some(1008)
        );
        assert_eq!(
            ProtocolError::from(tungstenite::Error::ConnectionClosed).close_code(),
            None
        );
    }
}
