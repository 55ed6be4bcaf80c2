//! Workspace file set and live-edit bookkeeping.
//!
//! The linker does not watch the file system itself. It consumes this
//! interface: which `.tex` files exist, what changed since the last look,
//! and for files open in an editor, when their buffer was last modified
//! (live edits are newer than anything on disk and must invalidate caches
//! the same way a save would).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::compiler::normalize_path;

/// The file-set difference between two scans.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Changes {
    pub created: HashSet<PathBuf>,
    pub modified: HashSet<PathBuf>,
    pub deleted: HashSet<PathBuf>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// A workspace rooted at a directory of repositories.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    snapshot: HashMap<PathBuf, SystemTime>,
    live_modified: HashMap<PathBuf, SystemTime>,
    open_files: HashSet<PathBuf>,
}

impl Workspace {
    pub fn new(root: &Path) -> Self {
        Self {
            root: normalize_path(root),
            snapshot: HashMap::new(),
            live_modified: HashMap::new(),
            open_files: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan(&self) -> HashMap<PathBuf, SystemTime> {
        let mut files = HashMap::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|ext| ext.to_str()) != Some("tex") {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            if let Ok(mtime) = metadata.modified() {
                files.insert(entry.path().to_path_buf(), mtime);
            }
        }
        files
    }

    /// All known `.tex` files of the current snapshot.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.snapshot.keys().map(PathBuf::as_path)
    }

    /// Rescans the workspace and reports what changed since the previous
    /// call. The first call reports every file as created.
    pub fn changes(&mut self) -> Changes {
        let current = self.scan();
        let mut changes = Changes::default();
        for (path, mtime) in &current {
            match self.snapshot.get(path) {
                None => {
                    changes.created.insert(path.clone());
                }
                Some(previous) if previous < mtime => {
                    changes.modified.insert(path.clone());
                }
                Some(_) => {}
            }
        }
        for path in self.snapshot.keys() {
            if !current.contains_key(path) {
                changes.deleted.insert(path.clone());
            }
        }
        self.snapshot = current;
        changes
    }

    /// The time of the last live (unsaved) edit reported for `path`.
    pub fn get_time_live_modified(&self, path: &Path) -> Option<SystemTime> {
        self.live_modified.get(&normalize_path(path)).copied()
    }

    /// Records a live edit of an open buffer.
    pub fn report_live_edit(&mut self, path: &Path, time: SystemTime) {
        self.live_modified.insert(normalize_path(path), time);
    }

    pub fn open_file(&mut self, path: &Path) {
        self.open_files.insert(normalize_path(path));
    }

    pub fn close_file(&mut self, path: &Path) {
        let path = normalize_path(path);
        self.open_files.remove(&path);
        self.live_modified.remove(&path);
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.open_files.contains(&normalize_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn changes_reports_created_modified_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("repo/source")).unwrap();
        let first = root.join("repo/source/a.tex");
        fs::write(&first, "a").unwrap();

        let mut workspace = Workspace::new(root);
        let changes = workspace.changes();
        assert_eq!(changes.created.len(), 1);
        assert!(changes.modified.is_empty());
        assert!(changes.deleted.is_empty());

        // a second scan without modifications is quiet
        assert!(workspace.changes().is_empty());

        let second = root.join("repo/source/b.tex");
        fs::write(&second, "b").unwrap();
        fs::remove_file(&first).unwrap();
        let changes = workspace.changes();
        assert!(changes.created.contains(&second));
        assert!(changes.deleted.contains(&first));
    }

    #[test]
    fn non_tex_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let mut workspace = Workspace::new(dir.path());
        assert!(workspace.changes().is_empty());
    }

    #[test]
    fn live_edits_and_open_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.tex");
        let mut workspace = Workspace::new(dir.path());
        assert!(!workspace.is_open(&file));
        workspace.open_file(&file);
        assert!(workspace.is_open(&file));
        let now = SystemTime::now();
        workspace.report_live_edit(&file, now);
        assert_eq!(workspace.get_time_live_modified(&file), Some(now));
        workspace.close_file(&file);
        assert!(!workspace.is_open(&file));
        assert_eq!(workspace.get_time_live_modified(&file), None);
    }
}
