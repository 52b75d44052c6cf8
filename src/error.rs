use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced by the driver.
///
/// The enum is `Clone` so that a single failure can complete the connect
/// future, the last-error slot, and the disconnect future without loss;
/// I/O causes are shared behind an `Arc` for the same reason.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("ERROR {error_code} ({sql_state}): {message}")]
    ServerError {
        error_code: u16,
        sql_state: String,
        message: String,
    },

    #[error("{connection_id} is still running a query (race lost: {race_lost})")]
    StillRunningQuery {
        connection_id: String,
        race_lost: bool,
    },

    #[error("insufficient parameters: query takes {expected} but {actual} were given")]
    InsufficientParameters { expected: usize, actual: usize },

    #[error("the connection is not connected to the server")]
    NotConnected,

    #[error("decoder left {remaining} unread bytes in the frame")]
    BufferNotFullyConsumed { remaining: usize },

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("query timed out")]
    TimedOut,

    #[error("Connection is being closed")]
    ConnectionClosed,

    #[error("Bad config error: {0}")]
    BadConfig(String),

    #[error("invalid packet received from server")]
    InvalidPacket,

    #[error("unexpected end of packet")]
    UnexpectedEof,

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("cannot nest transactions - a transaction is already active")]
    NestedTransaction,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}
