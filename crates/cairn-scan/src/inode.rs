//! Hard link tracking.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Identity of a file across its hard links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeKey {
    pub dev: u64,
    pub ino: u64,
}

/// Remembers the first path seen for each multiply-linked inode.
///
/// Later links to the same inode are sent as saved hard links pointing at
/// that first path.
#[derive(Debug, Default)]
pub struct HardLinkTracker {
    first_path: DashMap<InodeKey, String>,
}

impl HardLinkTracker {
    pub fn new() -> Self {
        Self {
            first_path: DashMap::new(),
        }
    }

    /// Record `path` for (dev, ino).
    ///
    /// Returns the earlier path when the inode was already seen, `None` when
    /// `path` is the first link.
    pub fn link_target(&self, dev: u64, ino: u64, path: &str) -> Option<String> {
        match self.first_path.entry(InodeKey { dev, ino }) {
            Entry::Occupied(seen) => Some(seen.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(path.to_string());
                None
            }
        }
    }

    /// Number of distinct inodes tracked.
    pub fn len(&self) -> usize {
        self.first_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_link_wins() {
        let tracker = HardLinkTracker::new();
        assert_eq!(tracker.link_target(1, 42, "/a"), None);
        assert_eq!(tracker.link_target(1, 42, "/b").as_deref(), Some("/a"));
        assert_eq!(tracker.link_target(1, 42, "/c").as_deref(), Some("/a"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_different_devices() {
        let tracker = HardLinkTracker::new();
        assert_eq!(tracker.link_target(1, 42, "/a"), None);
        assert_eq!(tracker.link_target(2, 42, "/mnt/a"), None);
        assert_eq!(tracker.len(), 2);
        assert!(!tracker.is_empty());
    }
}
