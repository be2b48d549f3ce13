use std::result;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

pub type Result<T> = result::Result<T, Error>;
