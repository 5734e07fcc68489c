// SPDX-License-Identifier: GPL-3.0-only

//! Reusable frame buffers
//!
//! The pool hands out [`Frame`]s backed by recycled pixel buffers so the
//! steady-state frame loop does not allocate. Every `acquire` issues a fresh
//! lease number; `release` accepts each lease exactly once, which turns a
//! buffer-ownership bug into a loud [`PoolError::DoubleRelease`] instead of
//! two stages silently sharing memory.
//!
//! The pool is bounded: at most `capacity` buffers exist (leased + free).
//! Once all of them are leased, [`PoolMode`] decides whether `acquire`
//! waits for a release or hands out a transient buffer outside the pool.

use super::frame::{Frame, FrameFormat};
use crate::constants::PoolMode;
use crate::errors::PoolError;
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Statistics about pool usage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum number of pooled buffers
    pub capacity: usize,
    /// Buffers currently owned by the pool (free + leased)
    pub pooled: usize,
    /// Buffers waiting for reuse
    pub free: usize,
    /// Buffers currently leased to a pipeline stage
    pub outstanding: usize,
    /// Fresh pooled allocations
    pub allocations: u64,
    /// Acquisitions served from the free list
    pub reuses: u64,
    /// Overflow-mode buffers allocated outside the pool
    pub transient: u64,
    /// Acquisitions that had to wait for a release
    pub waits: u64,
}

struct PoolInner {
    free: Vec<(FrameFormat, Vec<u8>)>,
    outstanding: HashSet<u64>,
    next_lease: u64,
    stats: PoolStats,
}

/// Bounded pool of frame buffers
pub struct FramePool {
    inner: Mutex<PoolInner>,
    released: Condvar,
    capacity: usize,
    mode: PoolMode,
}

impl FramePool {
    /// Create an empty pool; buffers are allocated lazily on first acquire
    pub fn new(capacity: usize, mode: PoolMode) -> Self {
        let capacity = capacity.max(1);
        debug!(capacity, mode = mode.display_name(), "Creating frame pool");
        Self {
            inner: Mutex::new(PoolInner {
                free: Vec::with_capacity(capacity),
                outstanding: HashSet::with_capacity(capacity),
                next_lease: 1,
                stats: PoolStats {
                    capacity,
                    ..PoolStats::default()
                },
            }),
            released: Condvar::new(),
            capacity,
            mode,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> PoolMode {
        self.mode
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire a buffer of the requested format
    ///
    /// In backpressure mode this blocks until a buffer is released. The
    /// contents of a reused buffer are whatever its previous holder left.
    pub fn acquire(&self, format: FrameFormat) -> Result<Frame, PoolError> {
        self.acquire_inner(format, None)
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout` with
    /// `PoolError::Exhausted`
    pub fn acquire_timeout(
        &self,
        format: FrameFormat,
        timeout: Duration,
    ) -> Result<Frame, PoolError> {
        self.acquire_inner(format, Some(Instant::now() + timeout))
    }

    /// Acquire a buffer and copy `source` into it (pixels, sequence, capture time)
    pub fn acquire_copy(&self, source: &Frame, timeout: Duration) -> Result<Frame, PoolError> {
        let mut frame = self.acquire_timeout(source.format(), timeout)?;
        frame.copy_from(source);
        Ok(frame)
    }

    fn acquire_inner(
        &self,
        format: FrameFormat,
        deadline: Option<Instant>,
    ) -> Result<Frame, PoolError> {
        let mut inner = self.lock();
        let mut waited = false;

        loop {
            if let Some(idx) = inner.free.iter().position(|(f, _)| *f == format) {
                let (_, data) = inner.free.swap_remove(idx);
                inner.stats.reuses += 1;
                return Ok(Self::lease(&mut inner, format, data));
            }

            if inner.outstanding.len() < self.capacity {
                // Make room by evicting a free buffer of another format
                if inner.free.len() + inner.outstanding.len() >= self.capacity
                    && let Some((evicted, _)) = inner.free.pop()
                {
                    trace!(%evicted, %format, "Evicting pooled buffer of other format");
                }
                inner.stats.allocations += 1;
                let data = vec![0; format.byte_len()];
                return Ok(Self::lease(&mut inner, format, data));
            }

            match self.mode {
                PoolMode::Overflow => {
                    inner.stats.transient += 1;
                    trace!(%format, "Pool exhausted, allocating transient buffer");
                    return Ok(Frame::new(format));
                }
                PoolMode::Backpressure => {
                    if !waited {
                        inner.stats.waits += 1;
                        waited = true;
                    }
                    inner = match deadline {
                        None => self
                            .released
                            .wait(inner)
                            .unwrap_or_else(PoisonError::into_inner),
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                return Err(PoolError::Exhausted {
                                    capacity: self.capacity,
                                });
                            }
                            self.released
                                .wait_timeout(inner, deadline - now)
                                .unwrap_or_else(PoisonError::into_inner)
                                .0
                        }
                    };
                }
            }
        }
    }

    fn lease(inner: &mut PoolInner, format: FrameFormat, data: Vec<u8>) -> Frame {
        let lease = inner.next_lease;
        inner.next_lease += 1;
        inner.outstanding.insert(lease);
        Frame::leased(format, data, lease)
    }

    /// Return a frame's buffer for reuse
    ///
    /// Transient frames are dropped. Releasing a lease that is not
    /// outstanding is a [`PoolError::DoubleRelease`].
    pub fn release(&self, frame: Frame) -> Result<(), PoolError> {
        let (format, data, lease) = frame.into_parts();
        let Some(lease) = lease else {
            return Ok(());
        };

        let mut inner = self.lock();
        if !inner.outstanding.remove(&lease) {
            return Err(PoolError::DoubleRelease { lease });
        }
        inner.free.push((format, data));
        drop(inner);

        self.released.notify_one();
        Ok(())
    }

    /// Whether the frame's lease is currently outstanding in this pool
    pub fn owns(&self, frame: &Frame) -> bool {
        frame
            .lease()
            .is_some_and(|lease| self.lock().outstanding.contains(&lease))
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            pooled: inner.free.len() + inner.outstanding.len(),
            free: inner.free.len(),
            outstanding: inner.outstanding.len(),
            ..inner.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    fn vga() -> FrameFormat {
        FrameFormat::rgba(640, 480)
    }

    #[test]
    fn test_release_then_reuse() {
        let pool = FramePool::new(2, PoolMode::Backpressure);
        let frame = pool.acquire(vga()).unwrap();
        assert!(frame.is_pooled());
        pool.release(frame).unwrap();

        let _again = pool.acquire(vga()).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.outstanding, 1);
    }

    #[test]
    fn test_format_mismatch_allocates() {
        let pool = FramePool::new(4, PoolMode::Backpressure);
        let frame = pool.acquire(vga()).unwrap();
        pool.release(frame).unwrap();

        let small = pool.acquire(FrameFormat::rgba(320, 240)).unwrap();
        assert_eq!(small.data().len(), 320 * 240 * 4);
        assert_eq!(pool.stats().allocations, 2);
    }

    #[test]
    fn test_double_release_detected() {
        let pool = FramePool::new(2, PoolMode::Backpressure);
        let frame = pool.acquire(vga()).unwrap();
        let lease = frame.lease().unwrap();
        let forged = Frame::leased(vga(), vec![0; vga().byte_len()], lease);

        pool.release(frame).unwrap();
        assert_eq!(pool.release(forged), Err(PoolError::DoubleRelease { lease }));
    }

    #[test]
    fn test_foreign_lease_rejected() {
        let a = FramePool::new(1, PoolMode::Backpressure);
        let b = FramePool::new(1, PoolMode::Backpressure);
        let frame = a.acquire(vga()).unwrap();
        assert!(!b.owns(&frame));
        assert!(b.release(frame).is_err());
    }

    #[test]
    fn test_transient_release_is_noop() {
        let pool = FramePool::new(1, PoolMode::Backpressure);
        assert_eq!(pool.release(Frame::new(vga())), Ok(()));
        assert_eq!(pool.stats().free, 0);
    }

    #[test]
    fn test_overflow_mode_hands_out_transient() {
        let pool = FramePool::new(1, PoolMode::Overflow);
        let first = pool.acquire(vga()).unwrap();
        let second = pool.acquire(vga()).unwrap();
        assert!(first.is_pooled());
        assert!(!second.is_pooled());
        assert_eq!(pool.stats().transient, 1);
        assert_eq!(pool.stats().pooled, 1);
    }

    #[test]
    fn test_backpressure_blocks_until_release() {
        let pool = Arc::new(FramePool::new(4, PoolMode::Backpressure));
        let mut held: Vec<Frame> = (0..4).map(|_| pool.acquire(vga()).unwrap()).collect();

        let (tx, rx) = mpsc::channel();
        let pool_clone = Arc::clone(&pool);
        let waiter = thread::spawn(move || {
            let frame = pool_clone.acquire(vga()).unwrap();
            tx.send(()).unwrap();
            pool_clone.release(frame).unwrap();
        });

        // Fifth acquire must still be waiting
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());

        pool.release(held.pop().unwrap()).unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        waiter.join().unwrap();

        for frame in held {
            pool.release(frame).unwrap();
        }
        assert!(pool.stats().waits >= 1);
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_acquire_timeout_reports_exhaustion() {
        let pool = FramePool::new(1, PoolMode::Backpressure);
        let _held = pool.acquire(vga()).unwrap();
        let result = pool.acquire_timeout(vga(), Duration::from_millis(20));
        assert_eq!(result.unwrap_err(), PoolError::Exhausted { capacity: 1 });
    }

    #[test]
    fn test_cap_bounds_pooled_buffers() {
        let pool = FramePool::new(2, PoolMode::Backpressure);
        for size in [10u32, 20, 30, 40] {
            let frame = pool.acquire(FrameFormat::rgba(size, size)).unwrap();
            pool.release(frame).unwrap();
            assert!(pool.stats().pooled <= 2);
        }
    }
}
