//! Frame transport: dials the server, then runs one reader task and one
//! writer task over the split stream.
//!
//! The reader delivers decoded frames to the connection core in strict
//! wire order; the writer drains an ordered channel of pre-encoded
//! packets. Both tasks hold only a weak reference to the core, so
//! dropping the last `Connection` handle tears the socket down.

use std::sync::{Arc, Weak};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::packet;

use super::core::ConnInner;

/// The transport runs over any duplex byte stream; tests inject
/// `tokio::io::duplex` pipes here.
pub trait StreamLike: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> StreamLike for T {}

pub(crate) type BoxedStream = Box<dyn StreamLike>;

/// Commands the writer task accepts, in order.
#[derive(Debug)]
pub(crate) enum WriteCmd {
    /// Pre-encoded frames; written and flushed as one unit.
    Packet(Vec<u8>),
    /// Flush, close the write half, and finish connection teardown.
    Shutdown,
}

/// Dial the configured server over TCP.
#[instrument(skip_all)]
pub(crate) async fn open(opts: &Opts) -> Result<BoxedStream> {
    let host = opts
        .host
        .as_deref()
        .ok_or_else(|| Error::BadConfig("missing host in connection options".to_string()))?;

    let stream = TcpStream::connect((host, opts.port)).await?;
    stream.set_nodelay(opts.tcp_nodelay)?;
    Ok(Box::new(stream))
}

/// Spawn the reader and writer tasks for an attached stream.
pub(crate) fn start(
    delegate: &Arc<ConnInner>,
    stream: BoxedStream,
    write_rx: mpsc::UnboundedReceiver<WriteCmd>,
) {
    let (read_half, write_half) = tokio::io::split(stream);
    tokio::spawn(read_loop(Arc::downgrade(delegate), read_half));
    tokio::spawn(write_loop(Arc::downgrade(delegate), write_half, write_rx));
}

async fn read_loop(delegate: Weak<ConnInner>, read_half: ReadHalf<BoxedStream>) {
    let mut reader = BufReader::new(read_half);
    let mut buffer = Vec::new();

    loop {
        let result = packet::read_payload(&mut reader, &mut buffer).await;

        // All handles dropped: closing the halves closes the socket.
        let Some(delegate) = delegate.upgrade() else {
            return;
        };

        match result {
            Ok(sequence_id) => {
                if let Err(err) = delegate.handle_frame(sequence_id, &buffer) {
                    delegate.handle_transport_error(err);
                    return;
                }
            }
            Err(err) => {
                delegate.handle_transport_error(err);
                return;
            }
        }
    }
}

async fn write_loop(
    delegate: Weak<ConnInner>,
    mut write_half: WriteHalf<BoxedStream>,
    mut rx: mpsc::UnboundedReceiver<WriteCmd>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriteCmd::Packet(bytes) => {
                let result = async {
                    write_half.write_all(&bytes).await?;
                    write_half.flush().await
                }
                .await;

                if let Err(err) = result {
                    if let Some(delegate) = delegate.upgrade() {
                        delegate.handle_transport_error(err.into());
                    }
                    return;
                }
            }
            WriteCmd::Shutdown => {
                let _ = write_half.flush().await;
                let _ = write_half.shutdown().await;
                if let Some(delegate) = delegate.upgrade() {
                    delegate.finish_close();
                }
                return;
            }
        }
    }
}
