//! Bounded FIFO of fetched files; the oldest file is deleted once the bound
//! is exceeded.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_FETCH_CACHE_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct FetchCache {
    capacity: usize,
    tracked: VecDeque<PathBuf>,
}

impl Default for FetchCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FETCH_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            tracked: VecDeque::with_capacity(capacity.saturating_add(1)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tracked.iter().any(|tracked| tracked == path)
    }

    /// Records `path` as the newest artifact. A path that is already tracked
    /// moves to the newest slot instead of being listed twice.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.tracked.retain(|tracked| *tracked != path);
        self.tracked.push_back(path);
        while self.tracked.len() > self.capacity {
            let Some(oldest) = self.tracked.pop_front() else {
                break;
            };
            if let Err(err) = fs::remove_file(&oldest) {
                log_trace!("evict {}: {err}", oldest.display());
            }
        }
    }
}
