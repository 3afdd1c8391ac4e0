//! Bounded lock-free MPMC queue.
//!
//! A ring of cells, each carrying a sequence counter next to its storage.
//! Producers race on a shared producer ticket, consumers on a consumer
//! ticket. A cell is writable when its sequence equals the producer's
//! claimed ticket, consumable when it equals ticket + 1; consuming advances
//! the sequence by the capacity to hand the cell to the next round. The
//! per-cell handshake keeps contention off a central head/tail pair at the
//! cost of one word per cell.
//!
//! Ordering: ticket CAS is relaxed; cell sequences publish with release and
//! are observed with acquire. No fences are required on claim failure.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

struct Cell<T> {
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded MPMC queue with sequence-tagged cells.
///
/// Capacity is rounded up to the next power of two, with a minimum of 2.
pub struct BoundedQueue<T> {
    buffer: Box<[CachePadded<Cell<T>>]>,
    mask: usize,
    capacity: usize,
    producer: CachePadded<AtomicUsize>,
    consumer: CachePadded<AtomicUsize>,
}

// Safety: cells are only written by the thread that wins the producer
// ticket and only read by the thread that wins the consumer ticket; the
// sequence handshake publishes the value between them.
unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

fn round_up_pow2(n: usize) -> usize {
    if n < 2 {
        return 2;
    }
    n.next_power_of_two()
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = round_up_pow2(capacity);
        let buffer: Box<[CachePadded<Cell<T>>]> = (0..capacity)
            .map(|i| {
                CachePadded::new(Cell {
                    seq: AtomicUsize::new(i),
                    value: UnsafeCell::new(MaybeUninit::uninit()),
                })
            })
            .collect();
        Self {
            buffer,
            mask: capacity - 1,
            capacity,
            producer: CachePadded::new(AtomicUsize::new(0)),
            consumer: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueue without waiting. Returns the item when the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut item = Some(item);
        let pushed = self.claim_and_write(|slot| {
            // Safety: `claim_and_write` hands us exclusive access to an
            // unoccupied cell.
            unsafe {
                (*slot).write(item.take().unwrap_or_else(|| unreachable!()));
            }
            true
        });
        match (pushed, item) {
            (true, _) => Ok(()),
            (false, Some(item)) => Err(item),
            (false, None) => unreachable!("item consumed without a claimed cell"),
        }
    }

    /// Enqueue the result of `produce`, constructing in place.
    ///
    /// When `produce` fails the claimed ticket is rolled back so the cell
    /// stays writable for a later attempt.
    ///
    /// # Errors
    ///
    /// `Ok(false)` means the queue was full; `Err(e)` propagates the
    /// producer's failure.
    pub fn try_push_with<F, E>(&self, produce: F) -> Result<bool, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut produce = Some(produce);
        let mut failure = None;
        let pushed = self.claim_and_write(|slot| {
            let produce = produce.take().unwrap_or_else(|| unreachable!());
            match produce() {
                Ok(value) => {
                    // Safety: exclusive access to an unoccupied cell.
                    unsafe {
                        (*slot).write(value);
                    }
                    true
                }
                Err(e) => {
                    failure = Some(e);
                    false
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(pushed),
        }
    }

    // Claims a producer ticket and invokes `write` with the cell storage.
    // `write` returns false to roll the ticket back (construction failed).
    fn claim_and_write(&self, mut write: impl FnMut(*mut MaybeUninit<T>) -> bool) -> bool {
        let mut pos = self.producer.load(Ordering::Relaxed);
        loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.seq.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;
            if diff == 0 {
                match self.producer.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        if write(cell.value.get()) {
                            cell.seq.store(pos.wrapping_add(1), Ordering::Release);
                            return true;
                        }
                        // Construction failed; restore the sequence so the
                        // slot remains writable.
                        cell.seq.store(pos, Ordering::Release);
                        return false;
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // This round's cell is still occupied: queue full.
                return false;
            } else {
                // Another producer claimed the cell; reload and retry.
                pos = self.producer.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeue without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let mut pos = self.consumer.load(Ordering::Relaxed);
        loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.seq.load(Ordering::Acquire);
            let diff = seq as isize - pos.wrapping_add(1) as isize;
            if diff == 0 {
                match self.consumer.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // Safety: the sequence handshake guarantees this
                        // cell holds an initialized value that no other
                        // consumer can claim.
                        let value = unsafe { (*cell.value.get()).assume_init_read() };
                        cell.seq
                            .store(pos.wrapping_add(self.capacity), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                // The cell for this round has not been written: queue empty.
                return None;
            } else {
                pos = self.consumer.load(Ordering::Relaxed);
            }
        }
    }

    /// Enqueue items until the first failure; the failing item is dropped.
    pub fn try_push_batch<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut count = 0;
        for item in items {
            if self.try_push(item).is_err() {
                break;
            }
            count += 1;
        }
        count
    }

    /// Dequeue up to `max` items, stopping at the first failure.
    pub fn try_pop_batch(&self, max: usize) -> Vec<T> {
        let mut items = Vec::new();
        for _ in 0..max {
            match self.try_pop() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        items
    }

    /// Approximate number of queued items; may be briefly stale under
    /// concurrency.
    pub fn approx_len(&self) -> usize {
        let p = self.producer.load(Ordering::Relaxed);
        let c = self.consumer.load(Ordering::Relaxed);
        p.wrapping_sub(c)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.approx_len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.approx_len() >= self.capacity
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        while self.try_pop().is_some() {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_capacity_rounds_up_to_power_of_two() {
        assert_eq!(BoundedQueue::<u32>::new(0).capacity(), 2);
        assert_eq!(BoundedQueue::<u32>::new(1).capacity(), 2);
        assert_eq!(BoundedQueue::<u32>::new(2).capacity(), 2);
        assert_eq!(BoundedQueue::<u32>::new(3).capacity(), 4);
        assert_eq!(BoundedQueue::<u32>::new(1000).capacity(), 1024);
    }

    #[test]
    fn test_push_pop_single_thread() {
        let queue = BoundedQueue::new(4);
        assert!(queue.is_empty());
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        assert_eq!(queue.approx_len(), 2);
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_push_fails_when_full() {
        let queue = BoundedQueue::new(2);
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        assert!(queue.is_full());
        assert_eq!(queue.try_push(3), Err(3));
        assert_eq!(queue.try_pop(), Some(1));
        queue.try_push(3).unwrap();
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
    }

    #[test]
    fn test_cells_are_reusable_across_rounds() {
        let queue = BoundedQueue::new(2);
        for round in 0..100 {
            queue.try_push(round).unwrap();
            assert_eq!(queue.try_pop(), Some(round));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_failed_construction_rolls_back_the_ticket() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(2);
        let result: Result<bool, &str> = queue.try_push_with(|| Err("construction failed"));
        assert_eq!(result, Err("construction failed"));
        assert!(queue.is_empty());

        // The slot must remain writable afterwards.
        assert_eq!(queue.try_push_with::<_, ()>(|| Ok(7)), Ok(true));
        queue.try_push(8).unwrap();
        assert_eq!(queue.try_push_with::<_, ()>(|| Ok(9)), Ok(false));
        assert_eq!(queue.try_pop(), Some(7));
        assert_eq!(queue.try_pop(), Some(8));
    }

    #[test]
    fn test_batch_stops_at_first_failure() {
        let queue = BoundedQueue::new(2);
        let pushed = queue.try_push_batch(vec![1, 2, 3, 4]);
        assert_eq!(pushed, 2);
        assert_eq!(queue.try_pop_batch(10), vec![1, 2]);
    }

    #[test]
    fn test_concurrent_push_pop_conserves_items() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 10_000;

        let queue = Arc::new(BoundedQueue::new(64));
        let popped = Arc::new(AtomicUsize::new(0));
        let sum = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let mut value = p * PER_PRODUCER + i;
                    loop {
                        match queue.try_push(value) {
                            Ok(()) => break,
                            Err(v) => {
                                value = v;
                                thread::yield_now();
                            }
                        }
                    }
                }
            }));
        }
        for _ in 0..CONSUMERS {
            let queue = Arc::clone(&queue);
            let popped = Arc::clone(&popped);
            let sum = Arc::clone(&sum);
            handles.push(thread::spawn(move || loop {
                if popped.load(Ordering::Relaxed) >= PRODUCERS * PER_PRODUCER {
                    break;
                }
                match queue.try_pop() {
                    Some(v) => {
                        sum.fetch_add(v, Ordering::Relaxed);
                        popped.fetch_add(1, Ordering::Relaxed);
                    }
                    None => thread::yield_now(),
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let total = PRODUCERS * PER_PRODUCER;
        assert_eq!(popped.load(Ordering::Relaxed), total);
        assert_eq!(sum.load(Ordering::Relaxed), total * (total - 1) / 2);
        assert_eq!(queue.approx_len(), 0);
    }

    #[test]
    fn test_drop_releases_queued_items() {
        let dropped = Arc::new(AtomicUsize::new(0));
        struct CountsDrop(Arc<AtomicUsize>);
        impl Drop for CountsDrop {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let queue = BoundedQueue::new(4);
        for _ in 0..3 {
            queue.try_push(CountsDrop(Arc::clone(&dropped))).ok();
        }
        drop(queue);
        assert_eq!(dropped.load(Ordering::Relaxed), 3);
    }
}
