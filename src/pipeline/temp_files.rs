//! Tracks the intermediate files of one run and deletes them when it ends.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Every intermediate file a run wrote. Dropping the set deletes them.
#[derive(Debug, Default)]
pub struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a path. Track before writing so half-written files go too.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Deletes one tracked file right away.
    pub fn release(&mut self, path: &Path) {
        self.paths.retain(|tracked| tracked != path);
        remove(path);
    }

    /// Paths currently tracked, in the order they were added.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Deletes everything tracked so far.
    pub fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            remove(&path);
        }
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => info!("Temporary file deleted: {}", path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("Temporary file already gone: {}", path.display());
        }
        Err(err) => warn!("Error deleting temporary file {}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_deletes_tracked_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        let keep = dir.path().join("comic.png");
        for path in [&a, &b, &keep] {
            std::fs::write(path, b"x").expect("write");
        }

        {
            let mut files = TempFiles::new();
            files.track(&a);
            files.track(&b);
            files.track(&a);
            assert_eq!(files.len(), 2);
        }

        assert!(!a.exists());
        assert!(!b.exists());
        assert!(keep.exists());
    }

    #[test]
    fn release_deletes_now_and_forgets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.png");
        std::fs::write(&a, b"x").expect("write");

        let mut files = TempFiles::new();
        files.track(&a);
        files.release(&a);
        assert!(!a.exists());
        assert!(files.is_empty());
    }

    #[test]
    fn never_written_files_are_fine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut files = TempFiles::new();
        files.track(dir.path().join("never.png"));
        files.cleanup();
        assert!(files.is_empty());
    }

    #[test]
    fn cleanup_runs_on_unwind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.png");
        std::fs::write(&a, b"x").expect("write");

        let path = a.clone();
        let result = std::panic::catch_unwind(move || {
            let mut files = TempFiles::new();
            files.track(path);
            panic!("render blew up");
        });
        assert!(result.is_err());
        assert!(!a.exists());
    }
}
