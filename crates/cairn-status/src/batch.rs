//! Batch detection and decoding.
//!
//! The server answers a status request with one line per client and marks
//! the end of the answer with an empty line. A buffer that ends in a single
//! newline is still being received.

use crate::error::StatusError;
use crate::record::StatusRecord;

/// Check if `buf` holds a whole batch.
pub fn batch_is_complete(buf: impl AsRef<[u8]>) -> bool {
    let buf = buf.as_ref();
    buf.len() > 2 && buf.ends_with(b"\n\n")
}

/// Decode a batch, or return `None` while it is incomplete.
///
/// One malformed line fails the whole batch.
pub fn decode_batch(buf: &str) -> Result<Option<Vec<StatusRecord>>, StatusError> {
    if !batch_is_complete(buf) {
        return Ok(None);
    }
    buf.split('\n')
        .filter(|line| !line.is_empty())
        .map(StatusRecord::decode_line)
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completeness() {
        assert!(!batch_is_complete(""));
        assert!(!batch_is_complete("\n\n"));
        assert!(!batch_is_complete("a\t3\ti\n"));
        assert!(batch_is_complete("a\t3\ti\n\n"));
        assert!(batch_is_complete(b"x\n\n".as_slice()));
    }

    #[test]
    fn test_two_records_in_order() {
        let buf = "alpha\t3\ti\n\nbeta\t3\tr\tP1\n\n";
        let records = decode_batch(buf).unwrap().unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.client.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_single_trailing_newline_is_incomplete() {
        let buf = "alpha\t3\ti\n\nbeta\t3\tr\tP1\n";
        assert!(decode_batch(buf).unwrap().is_none());
    }

    #[test]
    fn test_one_bad_line_fails_batch() {
        let buf = "alpha\t3\ti\nbeta\t3\tq\n\n";
        assert!(decode_batch(buf).unwrap_err().is_malformed());
    }
}
