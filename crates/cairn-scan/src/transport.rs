//! Frame transports.
//!
//! The scanner writes frames synchronously. A failed write is fatal to the
//! whole scan, so transports report errors and never retry.

use std::io::{self, Write};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::frame::Frame;

/// Default capacity of the frame channel.
pub const FRAME_CHANNEL_SIZE: usize = 1024;

/// Ordered, reliable sink for frames.
pub trait Transport {
    /// Write one frame, or fail.
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        (**self).write_frame(frame)
    }
}

/// Writes encoded frames to any [`Write`].
#[derive(Debug)]
pub struct StreamTransport<W> {
    writer: W,
    buf: Vec<u8>,
}

impl<W: Write> StreamTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: Vec::new(),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Transport for StreamTransport<W> {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        self.buf.clear();
        frame.encode_into(&mut self.buf)?;
        self.writer.write_all(&self.buf)
    }
}

/// Hands frames to an async task through a bounded channel.
///
/// `write_frame` blocks while the channel is full, so it must run on a
/// blocking thread, never inside an async task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Frame>,
}

/// Create a channel transport and the receiver that drains it.
pub fn frame_channel(capacity: usize) -> (ChannelTransport, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelTransport { tx }, rx)
}

impl Transport for ChannelTransport {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        self.tx
            .blocking_send(frame.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "frame channel closed"))
    }
}

/// Drain frames from the channel into an async writer.
///
/// Returns the number of frames written. A write error drops the receiver,
/// which makes the next [`ChannelTransport::write_frame`] fail.
pub async fn forward_frames<W>(mut rx: mpsc::Receiver<Frame>, mut writer: W) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut written = 0;
    while let Some(frame) = rx.recv().await {
        buf.clear();
        frame.encode_into(&mut buf)?;
        writer.write_all(&buf).await?;
        written += 1;
    }
    writer.flush().await?;
    Ok(written)
}

/// Keeps frames in memory, optionally failing after a number of writes.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    frames: Vec<Frame>,
    fail_after: Option<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `count` frames, then fail every write.
    pub fn failing_after(count: usize) -> Self {
        Self {
            frames: Vec::new(),
            fail_after: Some(count),
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl Transport for RecordingTransport {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        if self.fail_after.is_some_and(|limit| self.frames.len() >= limit) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset"));
        }
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// Discards frames; used for estimate-only runs.
#[derive(Debug, Default)]
pub struct NullTransport {
    frames: u64,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames that would have been sent.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Transport for NullTransport {
    fn write_frame(&mut self, _frame: &Frame) -> io::Result<()> {
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cairn_core::CommandTag;

    use super::*;
    use crate::frame::read_frame;

    #[test]
    fn test_stream_transport_encodes() {
        let mut transport = StreamTransport::new(Vec::new());
        transport
            .write_frame(&Frame::new(CommandTag::Directory, "/srv"))
            .unwrap();
        assert_eq!(transport.into_inner(), b"d0004/srv");
    }

    #[test]
    fn test_recording_failure_injection() {
        let mut transport = RecordingTransport::failing_after(1);
        let frame = Frame::new(CommandTag::File, "a");
        assert!(transport.write_frame(&frame).is_ok());
        assert!(transport.write_frame(&frame).is_err());
        assert_eq!(transport.frames().len(), 1);
    }

    #[test]
    fn test_channel_closed_is_broken_pipe() {
        let (mut transport, rx) = frame_channel(4);
        drop(rx);
        let err = transport
            .write_frame(&Frame::new(CommandTag::File, "a"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_forward_frames_in_order() {
        let (transport, rx) = frame_channel(4);
        let producer = tokio::task::spawn_blocking(move || {
            let mut transport = transport;
            for path in ["/a", "/b", "/c"] {
                transport
                    .write_frame(&Frame::new(CommandTag::File, path))
                    .unwrap();
            }
        });

        let mut out = Vec::new();
        let forward = forward_frames(rx, &mut out);
        let (written, joined) = tokio::join!(forward, producer);
        joined.unwrap();
        assert_eq!(written.unwrap(), 3);

        let mut cursor = std::io::Cursor::new(out);
        let mut paths = Vec::new();
        while let Some(frame) = read_frame(&mut cursor).unwrap() {
            paths.push(frame.payload().to_string());
        }
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
    }
}
