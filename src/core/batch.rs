//! Batching and statistics helpers

use crate::adapters::store::Session;
use std::ops::Range;
use std::time::{Duration, Instant};

/// Splits `items` into chunks of `size`, with each chunk's index range
///
/// # Examples
///
/// ```
/// use edi::core::batch::batched;
///
/// let items = [1, 2, 3, 4, 5];
/// let batches: Vec<_> = batched(&items, 2).collect();
/// assert_eq!(batches[0], (0..2, &items[0..2]));
/// assert_eq!(batches[2], (4..5, &items[4..5]));
/// ```
pub fn batched<T>(items: &[T], size: usize) -> impl Iterator<Item = (Range<usize>, &[T])> {
    let size = size.max(1);
    items.chunks(size).enumerate().map(move |(index, chunk)| {
        let start = index * size;
        (start..start + chunk.len(), chunk)
    })
}

/// Elapsed time and store operations over a span of work
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    started: Instant,
    queries: u64,
}

impl Statistics {
    pub fn start(session: &dyn Session) -> Self {
        Self {
            started: Instant::now(),
            queries: session.query_count(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Store operations issued since [`Statistics::start`]
    pub fn count(&self, session: &dyn Session) -> u64 {
        session.query_count().saturating_sub(self.queries)
    }
}
