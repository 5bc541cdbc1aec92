//! TCP server for the line-retrieval protocol.
//!
//! Handles incoming connections, decodes index requests, and answers them
//! from the shared line table.

use crate::config::ServerOptions;
use crate::protocol::{parse_request, ParseResult, Reply};
use crate::stats::{Counter, StatsReporter};
use crate::table::LineTable;
use bytes::{Buf, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace};

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Server instance
pub struct Server {
    options: ServerOptions,
    table: Arc<LineTable>,
    served: Counter,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server over an already built table
    pub fn new(options: ServerOptions, table: Arc<LineTable>) -> Self {
        let connection_limit = Arc::new(Semaphore::new(options.max_connections));
        Server {
            options,
            table,
            served: Counter::new(),
            connection_limit,
        }
    }

    /// Counter of requests whose response was written
    #[allow(dead_code)]
    pub fn served(&self) -> &Counter {
        &self.served
    }

    /// Bind the configured listen address
    pub fn bind(&self) -> io::Result<TcpListener> {
        let addr: SocketAddr = self
            .options
            .listen
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        create_listener(addr, self.options.backlog)
    }

    /// Bind and serve until the process exits
    pub async fn run(&self) -> io::Result<()> {
        let listener = self.bind()?;
        info!(
            address = %listener.local_addr()?,
            lines = self.table.len(),
            "Server listening"
        );

        let reporter =
            StatsReporter::spawn(self.served.clone(), self.options.stats_interval, "requests");
        let result = self.serve(listener).await;
        reporter.stop().await;
        result
    }

    /// Accept connections on `listener`, one task per connection
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        loop {
            // Wait for a connection slot
            let Ok(permit) = self.connection_limit.clone().acquire_owned().await else {
                info!("Connection limit closed, stopping");
                return Ok(());
            };

            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let table = Arc::clone(&self.table);
                    let served = self.served.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, table, served).await {
                            debug!(peer = %addr, error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Handle a single client connection.
///
/// Every complete request in the read buffer is answered into one output
/// buffer, which is written before the next read. Requests are counted as
/// served once their responses are written. An out-of-range index flushes
/// what is pending and closes the connection.
async fn handle_connection<S>(mut stream: S, table: Arc<LineTable>, served: Counter) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
    let mut output = Pending::new(&served);

    loop {
        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            trace!("Connection closed by client");
            return output.flush(&mut stream).await;
        }

        while let ParseResult::Complete(index, consumed) = parse_request(&buffer) {
            buffer.advance(consumed);

            let reply = Reply::lookup(&table, index);
            if !reply.encode(&mut output.bytes) {
                trace!(index, lines = table.len(), "Index out of range, closing");
                output.flush(&mut stream).await?;
                stream.shutdown().await?;
                return drain(&mut stream, &mut buffer).await;
            }
            output.replies += 1;
        }

        output.flush(&mut stream).await?;
    }
}

/// Encoded responses not yet written.
struct Pending<'a> {
    bytes: BytesMut,
    replies: u64,
    served: &'a Counter,
}

impl<'a> Pending<'a> {
    fn new(served: &'a Counter) -> Self {
        Self {
            bytes: BytesMut::with_capacity(BUFFER_SIZE),
            replies: 0,
            served,
        }
    }

    async fn flush<S>(&mut self, stream: &mut S) -> io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        if !self.bytes.is_empty() {
            stream.write_all(&self.bytes).await?;
            self.bytes.clear();
        }
        self.served.add(std::mem::take(&mut self.replies));
        Ok(())
    }
}

/// Discard input until the peer closes.
///
/// Closing a socket with unread input resets the connection, which can
/// discard responses the peer has not read yet. Pipelining clients have at
/// most a few requests in flight past the end, so this is short.
async fn drain<S>(stream: &mut S, buffer: &mut BytesMut) -> io::Result<()>
where
    S: AsyncRead + Unpin,
{
    loop {
        buffer.clear();
        if stream.read_buf(buffer).await? == 0 {
            return Ok(());
        }
    }
}

/// Create a listener with SO_REUSEADDR and the given backlog.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}
