use super::Indication;
use crossbeam::queue::ArrayQueue;

/// A pool of reusable indication buffers to reduce allocation pressure
/// along the pipeline.
///
/// Ownership transfers with the buffer: the indicate worker acquires,
/// the persist worker releases. Acquire never blocks; an empty pool
/// hands out a fresh allocation and an overfull pool drops releases on
/// the floor.
pub struct IndicationPool {
    pool: ArrayQueue<Indication>,
}

impl IndicationPool {
    /// Create a pool holding at most `capacity` idle buffers.
    pub fn new(capacity: usize) -> Self {
        let pool = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            let _ = pool.push(Indication::new());
        }
        Self { pool }
    }

    /// Take a buffer from the pool, allocating when none is idle.
    pub fn acquire(&self) -> Indication {
        self.pool.pop().unwrap_or_else(Indication::new)
    }

    /// Return a buffer to the pool after resetting it.
    pub fn release(&self, mut ind: Indication) {
        ind.reset();
        let _ = self.pool.push(ind);
    }

    /// Number of idle buffers currently held.
    pub fn idle(&self) -> usize {
        self.pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_cycles_buffers() {
        let pool = IndicationPool::new(2);
        assert_eq!(pool.idle(), 2);
        let mut a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.idle(), 0);
        a.write(b"k", b"v");
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 2);
        // released buffers come back empty
        let again = pool.acquire();
        assert!(again.is_empty());
    }

    #[test]
    fn acquire_from_empty_pool_allocates() {
        let pool = IndicationPool::new(1);
        let _a = pool.acquire();
        let b = pool.acquire();
        assert!(b.is_empty());
    }
}
