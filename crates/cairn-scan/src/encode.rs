//! Attribute record encoding.

use cairn_core::{Compression, Entry, RawStat};
use itertools::Itertools;

/// Turns an entry's raw stat data into its attribute record.
pub trait AttributeEncoder {
    fn encode(&self, entry: &Entry, compression: Compression) -> String;
}

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Encode a signed integer in base 64, most significant digit first.
pub fn int_to_base64(value: i64) -> String {
    let mut magnitude = value.unsigned_abs();
    let mut digits = Vec::new();
    loop {
        digits.push(ALPHABET[(magnitude & 0x3f) as usize]);
        magnitude >>= 6;
        if magnitude == 0 {
            break;
        }
    }
    if value < 0 {
        digits.push(b'-');
    }
    digits.iter().rev().map(|&b| b as char).collect()
}

/// Decode a value produced by [`int_to_base64`].
pub fn base64_to_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() || digits.len() > 11 {
        return None;
    }
    let mut magnitude: u64 = 0;
    for byte in digits.bytes() {
        let digit = ALPHABET.iter().position(|&a| a == byte)? as u64;
        magnitude = magnitude.checked_mul(64)?.checked_add(digit)?;
    }
    if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    }
}

/// Decoded form of a [`StatEncoder`] record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttribs {
    pub stat: RawStat,
    pub platform_attrs: u64,
    pub compression: Compression,
}

/// Default encoder: stat fields, platform attributes and compression level,
/// each as a base 64 integer, separated by spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatEncoder;

const FIELD_COUNT: usize = 15;

impl StatEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Parse a record back into its fields.
    pub fn decode(record: &str) -> Option<DecodedAttribs> {
        let values: Vec<i64> = record
            .split(' ')
            .map(base64_to_int)
            .collect::<Option<_>>()?;
        if values.len() != FIELD_COUNT {
            return None;
        }
        let u = |i: usize| values[i] as u64;
        let stat = RawStat {
            dev: u(0),
            ino: u(1),
            mode: values[2] as u32,
            nlink: u(3),
            uid: values[4] as u32,
            gid: values[5] as u32,
            rdev: u(6),
            size: u(7),
            blksize: u(8),
            blocks: u(9),
            atime: values[10],
            mtime: values[11],
            ctime: values[12],
        };
        Some(DecodedAttribs {
            stat,
            platform_attrs: u(13),
            compression: Compression::new(values[14].clamp(0, 9) as u8),
        })
    }
}

impl AttributeEncoder for StatEncoder {
    fn encode(&self, entry: &Entry, compression: Compression) -> String {
        let s = &entry.stat;
        // Unsigned fields go out bit-for-bit as i64.
        [
            s.dev as i64,
            s.ino as i64,
            i64::from(s.mode),
            s.nlink as i64,
            i64::from(s.uid),
            i64::from(s.gid),
            s.rdev as i64,
            s.size as i64,
            s.blksize as i64,
            s.blocks as i64,
            s.atime,
            s.mtime,
            s.ctime,
            entry.platform_attrs as i64,
            i64::from(compression.level()),
        ]
        .into_iter()
        .map(int_to_base64)
        .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use cairn_core::EntryKind;

    use super::*;

    #[test]
    fn test_int_to_base64_digits() {
        assert_eq!(int_to_base64(0), "A");
        assert_eq!(int_to_base64(63), "/");
        assert_eq!(int_to_base64(64), "BA");
        assert_eq!(int_to_base64(-1), "-B");
    }

    #[test]
    fn test_base64_extremes() {
        for value in [i64::MIN, i64::MAX, -64, 1_700_000_000] {
            assert_eq!(base64_to_int(&int_to_base64(value)), Some(value));
        }
        assert_eq!(base64_to_int(""), None);
        assert_eq!(base64_to_int("-"), None);
        assert_eq!(base64_to_int("A*"), None);
    }

    #[test]
    fn test_record_decodes_to_same_stat() {
        let stat = RawStat {
            dev: 2049,
            ino: 131_073,
            mode: 0o100644,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            size: 100,
            blksize: 4096,
            blocks: 8,
            atime: 1_700_000_000,
            mtime: 1_700_000_001,
            ctime: 1_700_000_002,
            ..RawStat::default()
        };
        let entry = Entry::new("/a.txt", EntryKind::Regular).with_stat(stat);
        let record = StatEncoder.encode(&entry, Compression::new(6));
        assert_eq!(record.split(' ').count(), FIELD_COUNT);

        let decoded = StatEncoder::decode(&record).unwrap();
        assert_eq!(decoded.stat, stat);
        assert_eq!(decoded.platform_attrs, 0);
        assert_eq!(decoded.compression, Compression::new(6));
    }

    #[test]
    fn test_decode_rejects_short_record() {
        assert!(StatEncoder::decode("A B C").is_none());
    }
}
