//! Fixture helpers for integration tests: throwaway on-disk projects with
//! Sable source files, cleaned up on drop.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A temporary project directory. Files are created relative to the root;
/// the whole tree is removed when the fixture is dropped.
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(name: &str) -> Self {
        let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
        let root = std::env::temp_dir().join(format!(
            "sable-test-{name}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("cannot create fixture directory");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a file under the project root, creating parent directories as
    /// needed.
    pub fn file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("cannot create fixture subdirectory");
        }
        fs::write(&path, contents).expect("cannot write fixture file");
        path
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root.join(relative)).expect("cannot read fixture file")
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root.join(relative).exists()
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}
