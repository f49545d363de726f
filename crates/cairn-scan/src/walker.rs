//! Tree walking and entry classification.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use jwalk::{Parallelism, WalkDir};

use cairn_core::{Entry, EntryKind, RawStat, ScanConfig};

use crate::inode::HardLinkTracker;

/// Source of classified entries below a start directory.
///
/// Implementations yield entries depth first, a directory's `DirBegin`
/// before its children and its `DirEnd` after them.
pub trait TreeWalk {
    fn walk<'a>(&'a self, root: &str) -> Box<dyn Iterator<Item = Entry> + 'a>;
}

/// Sorted depth-first walk over the local file system using jwalk.
///
/// Symbolic links are never followed.
#[derive(Debug, Default)]
pub struct JwalkWalker {
    cross_filesystems: bool,
    read_fifos: bool,
    read_blockdevs: bool,
    tracker: HardLinkTracker,
}

impl JwalkWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walker honouring the file system and device options of a scan.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            cross_filesystems: config.cross_filesystems,
            read_fifos: config.read_fifos,
            read_blockdevs: config.read_blockdevs,
            tracker: HardLinkTracker::new(),
        }
    }
}

impl TreeWalk for JwalkWalker {
    fn walk<'a>(&'a self, root: &str) -> Box<dyn Iterator<Item = Entry> + 'a> {
        let root_dev = match std::fs::symlink_metadata(root) {
            Ok(metadata) => RawStat::from_metadata(&metadata).dev,
            Err(e) => {
                let entry = Entry::error(root, EntryKind::NoStat, &e).with_top_level(true);
                return Box::new(std::iter::once(entry));
            }
        };

        let cross_filesystems = self.cross_filesystems;
        let walk = WalkDir::new(root)
            .parallelism(Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            })
            .sort(true)
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(0)
            .process_read_dir(move |_depth, _path, _state, children| {
                // Keep these directories as entries but do not read them.
                for child in children.iter_mut().flatten() {
                    if !child.file_type.is_dir() {
                        continue;
                    }
                    // Reported as NoAccess, so nothing below it may be sent.
                    let unnamed = child.file_name.to_str().is_none();
                    let foreign = !cross_filesystems
                        && child
                            .metadata()
                            .map(|m| RawStat::from_metadata(&m).dev)
                            .unwrap_or(root_dev)
                            != root_dev;
                    if unnamed || foreign {
                        child.read_children_path = None;
                    }
                }
            });

        Box::new(JwalkEntries {
            inner: Box::new(walk.into_iter()),
            walker: self,
            root_dev,
            open_dirs: Vec::new(),
            pending: VecDeque::new(),
            reported: HashSet::new(),
            finished: false,
        })
    }
}

type RawItem = Result<jwalk::DirEntry<((), ())>, jwalk::Error>;

struct JwalkEntries<'a> {
    inner: Box<dyn Iterator<Item = RawItem>>,
    walker: &'a JwalkWalker,
    root_dev: u64,
    /// Directories whose `DirEnd` is still owed, with their depth.
    open_dirs: Vec<(String, usize)>,
    pending: VecDeque<Entry>,
    /// Directories already reported as unreadable.
    reported: HashSet<PathBuf>,
    finished: bool,
}

impl JwalkEntries<'_> {
    /// Emit `DirEnd` for every open directory at `depth` or deeper.
    fn close_to(&mut self, depth: usize) {
        while let Some((path, open_depth)) = self.open_dirs.last() {
            if *open_depth < depth {
                break;
            }
            let entry =
                Entry::new(path.clone(), EntryKind::DirEnd).with_top_level(*open_depth == 0);
            self.open_dirs.pop();
            self.pending.push_back(entry);
        }
    }

    fn unreadable(&mut self, path: &Path, text: String) {
        if !self.reported.insert(path.to_path_buf()) {
            return;
        }
        let mut entry = Entry::new(path.to_string_lossy(), EntryKind::NoOpenDir);
        entry.os_error = Some(text);
        self.pending.push_back(entry);
    }

    fn push(&mut self, item: RawItem) {
        let dir_entry = match item {
            Ok(dir_entry) => dir_entry,
            Err(err) => {
                let text = err
                    .io_error()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| err.to_string());
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                self.unreadable(&path, text);
                return;
            }
        };

        let depth = dir_entry.depth;
        self.close_to(depth);
        let top_level = depth == 0;
        let path_buf = dir_entry.path();

        let Some(path) = path_buf.to_str().map(str::to_string) else {
            let err =
                std::io::Error::new(std::io::ErrorKind::InvalidData, "path is not valid UTF-8");
            let entry = Entry::error(path_buf.to_string_lossy(), EntryKind::NoAccess, &err)
                .with_top_level(top_level);
            self.pending.push_back(entry);
            return;
        };

        let metadata = match std::fs::symlink_metadata(&path_buf) {
            Ok(m) => m,
            Err(e) => {
                let entry = Entry::error(path, EntryKind::NoStat, &e).with_top_level(top_level);
                self.pending.push_back(entry);
                return;
            }
        };
        let stat = RawStat::from_metadata(&metadata);
        let file_type = metadata.file_type();

        let entry = if file_type.is_symlink() {
            match std::fs::read_link(&path_buf) {
                Ok(target) => Entry::new(path, EntryKind::SymLink)
                    .with_link_target(target.to_string_lossy()),
                Err(e) => Entry::error(path, EntryKind::NoFollow, &e),
            }
        } else if file_type.is_dir() {
            if !self.walker.cross_filesystems && stat.dev != self.root_dev {
                Entry::new(path, EntryKind::DirNoFsChange)
            } else if let Some(err) = dir_entry.read_children_error.as_ref() {
                let text = err
                    .io_error()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| err.to_string());
                self.unreadable(&path_buf, text);
                return;
            } else {
                self.open_dirs.push((path.clone(), depth));
                Entry::new(path, EntryKind::DirBegin)
            }
        } else if file_type.is_file() {
            if stat.nlink > 1 {
                match self.walker.tracker.link_target(stat.dev, stat.ino, &path) {
                    Some(first) => {
                        Entry::new(path, EntryKind::HardLinkSaved).with_link_target(first)
                    }
                    None => Entry::new(path, EntryKind::Regular),
                }
            } else {
                Entry::new(path, EntryKind::Regular)
            }
        } else {
            Entry::new(path, self.special_kind(&metadata))
        };

        self.pending
            .push_back(entry.with_stat(stat).with_top_level(top_level));
    }

    #[cfg(unix)]
    fn special_kind(&self, metadata: &std::fs::Metadata) -> EntryKind {
        use std::os::unix::fs::FileTypeExt;

        let file_type = metadata.file_type();
        if file_type.is_fifo() && self.walker.read_fifos {
            EntryKind::Fifo
        } else if file_type.is_block_device() && self.walker.read_blockdevs {
            EntryKind::Raw
        } else {
            EntryKind::Special
        }
    }

    #[cfg(not(unix))]
    fn special_kind(&self, _metadata: &std::fs::Metadata) -> EntryKind {
        EntryKind::Special
    }
}

impl Iterator for JwalkEntries<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(entry);
            }
            if self.finished {
                return None;
            }
            match self.inner.next() {
                Some(item) => self.push(item),
                None => {
                    self.finished = true;
                    self.close_to(0);
                }
            }
        }
    }
}
