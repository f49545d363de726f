//! Extended metadata (ACL and xattr) providers.

use std::io;

use cairn_core::CommandTag;

/// Answers whether an entry carries extended metadata, and fetches it.
pub trait ExtraMetaProvider {
    /// Check for extended metadata on `path` sent under `tag`.
    fn has_extrameta(&self, path: &str, tag: CommandTag) -> bool;

    /// Serialized extended metadata for `path`, if any.
    fn get_extrameta(&self, _path: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

impl<F> ExtraMetaProvider for F
where
    F: Fn(&str, CommandTag) -> bool,
{
    fn has_extrameta(&self, path: &str, tag: CommandTag) -> bool {
        self(path, tag)
    }
}

/// Provider for platforms or runs without extended metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtraMeta;

impl ExtraMetaProvider for NoExtraMeta {
    fn has_extrameta(&self, _path: &str, _tag: CommandTag) -> bool {
        false
    }
}

/// Record type marker for one extended attribute in the serialized blob.
pub const META_XATTR: u8 = b'X';

/// Append one `X<len><name><len><value>` record, lengths as eight hex digits.
pub fn push_xattr_record(out: &mut Vec<u8>, name: &[u8], value: &[u8]) {
    out.push(META_XATTR);
    out.extend_from_slice(format!("{:08X}", name.len()).as_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(format!("{:08X}", value.len()).as_bytes());
    out.extend_from_slice(value);
}

/// Extended attributes read through the `xattr` crate.
///
/// Links are never dereferenced: a symlink's own attributes are reported.
#[cfg(all(unix, feature = "xattr"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct XattrProvider;

#[cfg(all(unix, feature = "xattr"))]
impl ExtraMetaProvider for XattrProvider {
    fn has_extrameta(&self, path: &str, _tag: CommandTag) -> bool {
        match xattr::list(path) {
            Ok(mut names) => names.next().is_some(),
            Err(e) => {
                tracing::debug!(path, error = %e, "could not list extended attributes");
                false
            }
        }
    }

    fn get_extrameta(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        use std::os::unix::ffi::OsStrExt;

        let mut blob = Vec::new();
        for name in xattr::list(path)? {
            if let Some(value) = xattr::get(path, &name)? {
                push_xattr_record(&mut blob, name.as_bytes(), &value);
            }
        }
        Ok((!blob.is_empty()).then_some(blob))
    }
}
