use bytes::Bytes;
use serde::Serialize;

/// Control message that kills the running job.
pub const KILL: &str = "Kill";

/// A job request as a client builds it.
///
/// The server accepts a wider range of shapes than this (`input` may also be a string or an
/// array of byte values); clients only need one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobRequest {
    pub language: String,
    pub code: String,
    pub input: Bytes,
    pub arguments: Vec<String>,
    pub options: Vec<String>,
    pub timeout: i64,
}

impl JobRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            input: Bytes::new(),
            arguments: Vec::new(),
            options: Vec::new(),
            timeout: 60,
        }
    }

    pub fn input(mut self, input: impl Into<Bytes>) -> Self {
        self.input = input.into();
        self
    }

    pub fn arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn timeout(mut self, timeout: i64) -> Self {
        self.timeout = timeout;
        self
    }
}
