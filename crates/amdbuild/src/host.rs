//! File system implementations

use std::{cell::RefCell, hash::BuildHasherDefault, io, path::Path, rc::Rc};

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHasher};

use crate::collaborators::FileSystem;

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Reads URLs as paths relative to the working directory
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFileSystem;

impl FileSystem for DiskFileSystem {
    fn read_file(&self, url: &str) -> io::Result<String> {
        std::fs::read_to_string(url)
    }

    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }
}

/// In-memory source tree that counts reads per URL
///
/// Clones share their files and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Rc<RefCell<FxIndexMap<String, String>>>,
    reads: Rc<RefCell<FxHashMap<String, usize>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(self, url: &str, contents: &str) -> Self {
        self.insert(url, contents);
        self
    }

    pub fn insert(&self, url: &str, contents: &str) {
        self.files
            .borrow_mut()
            .insert(url.to_owned(), contents.to_owned());
    }

    pub fn read_count(&self, url: &str) -> usize {
        self.reads.borrow().get(url).copied().unwrap_or(0)
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_file(&self, url: &str) -> io::Result<String> {
        *self.reads.borrow_mut().entry(url.to_owned()).or_insert(0) += 1;
        self.files.borrow().get(url).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{url} does not exist"))
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }
}
