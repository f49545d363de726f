//! Polling client for the server status port.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::batch::{batch_is_complete, decode_batch};
use crate::error::StatusError;
use crate::record::StatusRecord;
use crate::request::StatusRequest;
use crate::throttle::RequestThrottle;

/// How long one poll waits for the socket before giving up on this tick.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Terminator of a browse listing.
pub const LIST_END: &str = "\n-list end-\n";

const READ_CHUNK: usize = 4096;

/// Result of a one-shot status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// The server knows no clients.
    NoClients,
    /// Raw browse listing, terminator included.
    Listing(String),
    /// Decoded client records.
    Records(Vec<StatusRecord>),
}

/// Connection to the status port of a local server.
pub struct StatusClient {
    stream: TcpStream,
    request: StatusRequest,
    throttle: RequestThrottle,
    buf: Vec<u8>,
}

impl StatusClient {
    /// Connect to the status port on localhost.
    pub async fn connect(port: u16, request: StatusRequest) -> Result<Self, StatusError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let stream = TcpStream::connect(addr).await?;
        tracing::debug!(target: "cairn::status", %addr, "connected to status port");
        Ok(Self::from_stream(stream, request))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream, request: StatusRequest) -> Self {
        Self {
            stream,
            request,
            throttle: RequestThrottle::new(),
            buf: Vec::new(),
        }
    }

    /// Write the current request unconditionally.
    pub async fn send_request(&mut self) -> Result<(), StatusError> {
        let line = self.request.to_line();
        tracing::trace!(target: "cairn::status", request = line.trim_end(), "status request");
        self.stream.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Write the current request if the throttle allows it.
    pub async fn maybe_request(&mut self) -> Result<bool, StatusError> {
        if !self.throttle.ready() {
            return Ok(false);
        }
        self.send_request().await?;
        Ok(true)
    }

    /// Read whatever is available without waiting.
    ///
    /// Returns `false` when the socket has nothing yet.
    pub fn try_read(&mut self) -> Result<bool, StatusError> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.stream.try_read(&mut chunk) {
            Ok(0) => Err(StatusError::Closed),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait up to [`POLL_INTERVAL`] for data and read it.
    async fn poll_read(&mut self) -> Result<bool, StatusError> {
        match tokio::time::timeout(POLL_INTERVAL, self.stream.readable()).await {
            Ok(ready) => {
                ready?;
                self.try_read()
            }
            Err(_) => Ok(false),
        }
    }

    /// Bytes received and not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Decode the buffer once it holds a whole batch.
    ///
    /// The buffer is emptied whenever a batch was complete, including when
    /// it failed to decode.
    pub fn take_batch(&mut self) -> Result<Option<Vec<StatusRecord>>, StatusError> {
        if !batch_is_complete(&self.buf) {
            return Ok(None);
        }
        let buf = std::mem::take(&mut self.buf);
        let text = String::from_utf8(buf)
            .map_err(|e| StatusError::malformed("", format!("batch is not UTF-8: {e}")))?;
        decode_batch(&text)
    }

    /// Keep requesting and reading until a whole batch arrives.
    ///
    /// A malformed batch is returned as an error; calling again retries on
    /// the next request tick.
    pub async fn next_batch(&mut self) -> Result<Vec<StatusRecord>, StatusError> {
        loop {
            self.maybe_request().await?;
            self.poll_read().await?;
            if let Some(records) = self.take_batch()? {
                return Ok(records);
            }
        }
    }

    /// Send one request and wait for the whole answer.
    pub async fn snapshot(mut self) -> Result<Snapshot, StatusError> {
        self.send_request().await?;
        loop {
            self.stream.readable().await?;
            if !self.try_read()? {
                continue;
            }
            if self.buf == b"\n" {
                return Ok(Snapshot::NoClients);
            }
            if self
                .buf
                .windows(LIST_END.len())
                .any(|w| w == LIST_END.as_bytes())
            {
                let text = String::from_utf8_lossy(&self.buf).into_owned();
                return Ok(Snapshot::Listing(text));
            }
            if let Some(records) = self.take_batch()? {
                return Ok(Snapshot::Records(records));
            }
        }
    }
}
