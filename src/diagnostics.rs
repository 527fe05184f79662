//! A small atomic counter for tracking recoverable problems (skipped files,
//! lossy conversions) across a single CLI invocation.

use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;

/// Tracks warnings and errors seen while walking a directory or archive.
/// Cheap to share by reference since every op is a single atomic fetch-add.
#[derive(Default)]
pub struct Counter {
    warning: AtomicUsize,
    error: AtomicUsize,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_warning(&self) {
        self.warning.fetch_add(1, SeqCst);
    }

    pub fn inc_error(&self) {
        self.error.fetch_add(1, SeqCst);
    }

    pub fn warnings(&self) -> usize {
        self.warning.load(SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.error.load(SeqCst)
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Warnings: {}, Errors: {}", self.warnings(), self.errors())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_independently() {
        let c = Counter::new();
        c.inc_warning();
        c.inc_warning();
        c.inc_error();
        assert_eq!(c.warnings(), 2);
        assert_eq!(c.errors(), 1);
    }
}
