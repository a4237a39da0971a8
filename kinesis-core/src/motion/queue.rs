//! Planner → step scheduler block queue
//!
//! Bounded FIFO with one producer (planner, main context) and one consumer
//! (step scheduler, interrupt context). Every index mutation happens inside
//! a critical section, so neither side can observe a torn head/tail.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use super::block::MotionBlock;

/// Default queue depth
pub const QUEUE_DEPTH: usize = 16;

/// Bounded motion block ring buffer
pub struct PlannerQueue<const N: usize = QUEUE_DEPTH> {
    blocks: Mutex<RefCell<Deque<MotionBlock, N>>>,
}

impl<const N: usize> Default for PlannerQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PlannerQueue<N> {
    /// Create an empty queue
    pub const fn new() -> Self {
        Self {
            blocks: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Append a block
    ///
    /// Returns the block back when the queue is full; the caller keeps it
    /// and retries once the scheduler has drained a slot.
    pub fn push(&self, block: MotionBlock) -> Result<(), MotionBlock> {
        critical_section::with(|cs| self.blocks.borrow_ref_mut(cs).push_back(block))
    }

    /// Remove the oldest block
    pub fn pop(&self) -> Option<MotionBlock> {
        critical_section::with(|cs| self.blocks.borrow_ref_mut(cs).pop_front())
    }

    /// Number of queued blocks
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.blocks.borrow_ref(cs).len())
    }

    /// Check for an empty queue
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check for a full queue
    pub fn is_full(&self) -> bool {
        critical_section::with(|cs| self.blocks.borrow_ref(cs).is_full())
    }

    /// Free slots
    pub fn free(&self) -> usize {
        N - self.len()
    }

    /// Drop every queued block
    pub fn clear(&self) {
        critical_section::with(|cs| self.blocks.borrow_ref_mut(cs).clear());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn block(tag: u32) -> MotionBlock {
        MotionBlock::new([tag, 0, 0, 0], 0, 1.0)
    }

    #[test]
    fn test_fifo_order() {
        let queue: PlannerQueue<4> = PlannerQueue::new();
        queue.push(block(1)).unwrap();
        queue.push(block(2)).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().map(|b| b.steps[0]), Some(1));
        assert_eq!(queue.pop().map(|b| b.steps[0]), Some(2));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_full_returns_block() {
        let queue: PlannerQueue<2> = PlannerQueue::new();
        queue.push(block(1)).unwrap();
        queue.push(block(2)).unwrap();
        assert!(queue.is_full());
        assert_eq!(queue.push(block(3)).map_err(|b| b.steps[0]), Err(3));
        assert_eq!(queue.free(), 0);
    }

    #[test]
    fn test_clear() {
        let queue: PlannerQueue<4> = PlannerQueue::new();
        queue.push(block(1)).unwrap();
        queue.clear();
        assert!(queue.is_empty());
    }

    proptest! {
        /// Any interleaving of pushes and pops yields blocks in push order
        #[test]
        fn prop_order_preserved(ops in proptest::collection::vec(any::<bool>(), 1..200)) {
            let queue: PlannerQueue<8> = PlannerQueue::new();
            let mut next_in = 0u32;
            let mut next_out = 0u32;
            for push in ops {
                if push {
                    if queue.push(block(next_in)).is_ok() {
                        next_in += 1;
                    }
                } else if let Some(b) = queue.pop() {
                    prop_assert_eq!(b.steps[0], next_out);
                    next_out += 1;
                }
            }
            while let Some(b) = queue.pop() {
                prop_assert_eq!(b.steps[0], next_out);
                next_out += 1;
            }
            prop_assert_eq!(next_in, next_out);
        }
    }
}
