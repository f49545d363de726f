//! Tagged string frames and their wire encoding.
//!
//! A frame is written as the tag byte, the payload length as four upper-case
//! hex digits, then the payload bytes.

use std::io::{self, Read, Write};

use cairn_core::CommandTag;

/// Largest payload a frame header can describe.
pub const MAX_FRAME_PAYLOAD: usize = 0xFFFF;

/// Length of the tag plus length header.
pub const FRAME_HEADER_LEN: usize = 5;

/// One tagged unit on the phase 1 stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    tag: CommandTag,
    payload: String,
}

impl Frame {
    pub fn new(tag: CommandTag, payload: impl Into<String>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    pub fn tag(&self) -> CommandTag {
        self.tag
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Append the wire encoding of this frame to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let len = self.payload.len();
        if len > MAX_FRAME_PAYLOAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame payload of {len} bytes exceeds {MAX_FRAME_PAYLOAD}"),
            ));
        }
        out.push(self.tag.as_byte());
        write!(out, "{len:04X}")?;
        out.extend_from_slice(self.payload.as_bytes());
        Ok(())
    }

    /// Wire encoding of this frame.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        self.encode_into(&mut out)?;
        Ok(out)
    }
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// Read one frame. Returns `None` on a clean end of stream.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Frame>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header[..1]) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    reader.read_exact(&mut header[1..])?;

    let tag = CommandTag::from_byte(header[0])
        .ok_or_else(|| invalid_data(format!("unknown command tag {:?}", header[0] as char)))?;
    let len_text = std::str::from_utf8(&header[1..])
        .map_err(|_| invalid_data("frame length is not ASCII".to_string()))?;
    let len = usize::from_str_radix(len_text, 16)
        .map_err(|_| invalid_data(format!("bad frame length {len_text:?}")))?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let payload = String::from_utf8(payload)
        .map_err(|_| invalid_data("frame payload is not UTF-8".to_string()))?;
    Ok(Some(Frame { tag, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = Frame::new(CommandTag::File, "/etc/hosts");
        assert_eq!(frame.encode().unwrap(), b"f000A/etc/hosts");
    }

    #[test]
    fn test_read_back_sequence() {
        let mut wire = Vec::new();
        Frame::new(CommandTag::Attribs, "A B C").encode_into(&mut wire).unwrap();
        Frame::new(CommandTag::SoftLink, "").encode_into(&mut wire).unwrap();

        let mut cursor = std::io::Cursor::new(wire);
        let first = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(first.tag(), CommandTag::Attribs);
        assert_eq!(first.payload(), "A B C");
        let second = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(second.payload(), "");
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let frame = Frame::new(CommandTag::File, "x".repeat(MAX_FRAME_PAYLOAD + 1));
        let err = frame.encode().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_truncated_frame_is_error() {
        let mut cursor = std::io::Cursor::new(b"f0010abc".to_vec());
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn test_unknown_tag_is_error() {
        let mut cursor = std::io::Cursor::new(b"Z0000".to_vec());
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
