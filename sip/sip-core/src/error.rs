use sip_types::header::HeaderError;
use std::io;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("request timed out")]
    RequestTimedOut,
    #[error("transaction cancelled")]
    Cancelled,
    #[error("transaction already terminated")]
    TransactionTerminated,
    #[error("peer responded with {0:?}")]
    Failure(sip_types::Code),
    #[error("message of {size} bytes exceeds the {limit} byte limit of the transport")]
    MessageTooLarge { size: usize, limit: usize },
}
