//! Tiered pool of reusable byte buffers.
//!
//! Request sessions borrow a fixed-size buffer from a small set of size
//! classes rather than allocating per read. Each class is backed by a bounded
//! lock-free queue, so the pool never blocks: an empty class allocates a
//! fresh buffer on demand and a full class discards the returned one instead
//! of queueing it. Reserving many small buffers and few large ones bounds
//! both allocation churn and peak memory.

use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Weak},
};

use crossbeam_queue::ArrayQueue;
use log::debug;

/// Maximum size, in bytes, of a single protocol line. Bounds the large
/// buffer class and sets the record-too-large threshold.
pub const MAX_LINE_SIZE: usize = 1_000_000;

/// Buffer size of the default small class. Most write bodies fit here.
pub const SMALL_BUFFER_SIZE: usize = 50_000;

/// Configuration for one pool size class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeClassConfig {
    /// Byte length of every buffer in this class.
    pub buffer_size: usize,
    /// Maximum number of idle buffers the class retains.
    pub capacity: usize,
}

/// Pool configuration: size classes in ascending buffer-size order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Size classes, smallest buffer size first.
    pub classes: Vec<SizeClassConfig>,
}

impl Default for PoolConfig {
    /// 500 small buffers of [`SMALL_BUFFER_SIZE`] and 30 large buffers of
    /// [`MAX_LINE_SIZE`].
    fn default() -> Self {
        Self {
            classes: vec![
                SizeClassConfig {
                    buffer_size: SMALL_BUFFER_SIZE,
                    capacity: 500,
                },
                SizeClassConfig {
                    buffer_size: MAX_LINE_SIZE,
                    capacity: 30,
                },
            ],
        }
    }
}

#[derive(Debug)]
struct SizeClass {
    buffer_size: usize,
    idle: ArrayQueue<Vec<u8>>,
}

/// A process-wide pool of idle buffers, one bounded queue per size class.
///
/// Constructed once at service start and shared by handle; every operation
/// takes `&self` and is safe under concurrent use from any number of
/// sessions. Two sessions never observe the same buffer.
#[derive(Debug)]
pub struct BufferPool {
    classes: Vec<SizeClass>,
}

impl BufferPool {
    /// Create a pool and pre-fill every class to its configured capacity.
    ///
    /// # Panics
    ///
    /// Panics if `config` has no classes, a class with a zero buffer size or
    /// capacity, or classes not in strictly ascending buffer-size order.
    #[must_use]
    pub fn new(config: PoolConfig) -> Arc<Self> {
        assert!(
            !config.classes.is_empty(),
            "pool requires at least one size class"
        );
        assert!(
            config
                .classes
                .windows(2)
                .all(|pair| pair[0].buffer_size < pair[1].buffer_size),
            "size classes must be strictly ascending"
        );

        let classes = config
            .classes
            .iter()
            .map(|class| {
                assert!(class.buffer_size > 0, "buffer size must be non-zero");
                let idle = ArrayQueue::new(class.capacity);
                for _ in 0..class.capacity {
                    let _ = idle.push(vec![0; class.buffer_size]);
                }
                SizeClass {
                    buffer_size: class.buffer_size,
                    idle,
                }
            })
            .collect();

        Arc::new(Self { classes })
    }

    /// Borrow a buffer whose length covers `size_hint`.
    ///
    /// Selects the smallest class whose buffer size covers the hint, or the
    /// largest class when none does. Pops an idle buffer if one is available
    /// and allocates a fresh one otherwise. Never blocks, never fails.
    ///
    /// Reused buffers are not cleared; callers must not assume zeroed
    /// contents.
    #[must_use]
    pub fn acquire(self: &Arc<Self>, size_hint: usize) -> PooledBuffer {
        let class = self.class_for(size_hint);
        let data = class.idle.pop().unwrap_or_else(|| {
            debug!("pool class empty, allocating fresh {} byte buffer", class.buffer_size);
            vec![0; class.buffer_size]
        });
        PooledBuffer {
            data,
            pool: Arc::downgrade(self),
        }
    }

    /// Number of idle buffers currently held per class.
    #[must_use]
    pub fn idle_counts(&self) -> Vec<usize> {
        self.classes.iter().map(|class| class.idle.len()).collect()
    }

    fn class_for(&self, size_hint: usize) -> &SizeClass {
        self.classes
            .iter()
            .find(|class| class.buffer_size >= size_hint)
            .unwrap_or_else(|| &self.classes[self.classes.len() - 1])
    }

    /// Return a buffer to the first class that can hold it, discarding it
    /// when that class is already full.
    fn release(&self, buffer: Vec<u8>) {
        if buffer.is_empty() {
            return;
        }
        if let Some(class) = self
            .classes
            .iter()
            .find(|class| buffer.len() <= class.buffer_size)
        {
            // A full queue rejects the push and the buffer is dropped.
            let _ = class.idle.push(buffer);
        }
    }
}

/// An exclusive lease on one pooled buffer.
///
/// Dereferences to the underlying byte slice. Dropping the lease returns the
/// buffer to its pool (or frees it when the pool is gone or full), so every
/// exit path of a session, including cancellation, releases its buffer.
#[derive(Debug)]
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Weak<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target { &self.data }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.data }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.release(std::mem::take(&mut self.data));
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn two_class_pool(small_cap: usize, large_cap: usize) -> Arc<BufferPool> {
        BufferPool::new(PoolConfig {
            classes: vec![
                SizeClassConfig {
                    buffer_size: 8,
                    capacity: small_cap,
                },
                SizeClassConfig {
                    buffer_size: 64,
                    capacity: large_cap,
                },
            ],
        })
    }

    #[rstest]
    #[case(0, 8)]
    #[case(8, 8)]
    #[case(9, 64)]
    #[case(64, 64)]
    #[case(65, 64)] // beyond every class: largest wins
    fn acquire_selects_covering_class(#[case] hint: usize, #[case] expected_len: usize) {
        let pool = two_class_pool(2, 2);
        assert_eq!(pool.acquire(hint).len(), expected_len);
    }

    #[test]
    fn acquire_allocates_fresh_when_class_empty() {
        let pool = two_class_pool(1, 1);
        let first = pool.acquire(8);
        let second = pool.acquire(8);
        assert_eq!(first.len(), 8);
        assert_eq!(second.len(), 8);
        assert_eq!(pool.idle_counts(), vec![0, 1]);
    }

    #[test]
    fn released_buffer_is_reused_without_clearing() {
        let pool = two_class_pool(1, 1);
        {
            let mut lease = pool.acquire(8);
            lease[0] = 0xAB;
        }
        let lease = pool.acquire(8);
        assert_eq!(lease[0], 0xAB);
    }

    #[test]
    fn release_to_full_class_discards_buffer() {
        let pool = two_class_pool(1, 1);
        let a = pool.acquire(8);
        let b = pool.acquire(8);
        drop(a);
        drop(b);
        assert_eq!(pool.idle_counts()[0], 1);
    }

    #[test]
    fn drop_after_pool_gone_does_not_panic() {
        let pool = two_class_pool(1, 1);
        let lease = pool.acquire(8);
        drop(pool);
        drop(lease);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_sessions_never_exceed_class_capacity() {
        let pool = two_class_pool(4, 2);
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let mut lease = pool.acquire(8);
                    lease[0] = lease[0].wrapping_add(1);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.expect("pool task panicked");
        }
        let idle = pool.idle_counts();
        assert!(idle[0] <= 4, "small class overflowed: {idle:?}");
        assert!(idle[1] <= 2, "large class overflowed: {idle:?}");
    }
}
