//! An asynchronous MySQL client driver.
//!
//! The entry point is [`Connection`]: configure it with [`Opts`], call
//! [`Connection::connect`], then issue queries with
//! [`Connection::send_query`] and [`Connection::send_prepared_statement`].
//! At most one query is in flight per connection; issuing a second one
//! while the first is pending fails immediately with
//! [`Error::StillRunningQuery`].

pub mod charset;
pub mod constant;
pub mod error;
mod opts;
pub mod protocol;
mod resultset;
mod value;
mod version;

mod conn;

pub use conn::Connection;
pub use error::{Error, Result};
pub use opts::{Opts, SslMode};
pub use resultset::{QueryResult, ResultSet, Row};
pub use value::{DateTime, TimeValue, Value};
pub use version::ServerVersion;

#[cfg(test)]
mod opts_test;
