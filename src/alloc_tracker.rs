//! Process-wide (thread-local, since tensors are single-threaded) bookkeeping
//! of outstanding storage allocations by size class, so tests can assert that
//! a training loop leaves nothing behind.

use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static BUCKETS: RefCell<HashMap<usize, i64>> = RefCell::new(HashMap::new());
}

fn size_class(n: usize) -> usize {
    n.next_power_of_two().max(1)
}

pub(crate) fn track_alloc(n: usize) {
    BUCKETS.with(|b| {
        *b.borrow_mut().entry(size_class(n)).or_insert(0) += 1;
    });
}

pub(crate) fn track_free(n: usize) {
    BUCKETS.with(|b| {
        *b.borrow_mut().entry(size_class(n)).or_insert(0) -= 1;
    });
}

/// Number of storage blocks allocated and not yet freed.
pub fn outstanding() -> usize {
    BUCKETS.with(|b| b.borrow().values().filter(|&&c| c > 0).map(|&c| c as usize).sum())
}

/// True once every allocation tracked so far has been matched by a free.
pub fn all_freed() -> bool {
    outstanding() == 0
}

/// Resets the tracker. Intended for test isolation only.
#[cfg(test)]
pub(crate) fn reset() {
    BUCKETS.with(|b| b.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_alloc_and_free_symmetrically() {
        reset();
        assert!(all_freed());
        track_alloc(16);
        track_alloc(100);
        assert_eq!(outstanding(), 2);
        track_free(16);
        assert_eq!(outstanding(), 1);
        track_free(100);
        assert!(all_freed());
    }
}
