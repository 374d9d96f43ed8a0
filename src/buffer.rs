//! Per-channel circular buffer bank.
//!
//! Each channel owns a contiguous region of [`NUM_BUFF`](crate::NUM_BUFF)
//! fixed-size slots addressed by the low bits of a monotonic write counter.
//! There is no free/used bitmap and no per-slot lock: the ring is strictly
//! single-producer (the channel's reader thread) / single-consumer (the
//! coordinator), and ordering is carried entirely by the counter. The
//! counter bump is a release store after the slot copy, matched by an
//! acquire load on the consumer side, so a consumer that observes
//! `write_idx > k` also observes the bytes of slot `k`.
//!
//! If the consumer falls more than `NUM_BUFF` blocks behind, the producer
//! silently overwrites unread slots; the stream is real-time and downstream
//! tolerates the resulting block loss.

use crate::NUM_BUFF;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct ChannelRing {
    slots: UnsafeCell<Box<[u8]>>,
    block_bytes: usize,
    write_idx: AtomicU64,
}

// One producer writes slot (write_idx % NUM_BUFF) while the consumer only
// reads slots below write_idx; accesses to a slot are ordered by the
// release/acquire pair on write_idx.
unsafe impl Sync for ChannelRing {}

impl ChannelRing {
    pub fn new(block_bytes: usize) -> ChannelRing {
        ChannelRing {
            slots: UnsafeCell::new(vec![0u8; NUM_BUFF * block_bytes].into_boxed_slice()),
            block_bytes,
            write_idx: AtomicU64::new(0),
        }
    }

    pub fn block_bytes(&self) -> usize {
        self.block_bytes
    }

    /// Blocks produced so far; slots `0..write_idx` are readable (modulo
    /// overwrite of the oldest).
    pub fn write_idx(&self) -> u64 {
        self.write_idx.load(Ordering::Acquire)
    }

    /// Copy one block into the next slot and publish it. Producer side
    /// only; must be called from a single thread.
    pub fn produce(&self, block: &[u8]) {
        assert_eq!(block.len(), self.block_bytes);
        let idx = self.write_idx.load(Ordering::Relaxed);
        let offset = (idx as usize % NUM_BUFF) * self.block_bytes;
        unsafe {
            let slots = &mut *self.slots.get();
            slots[offset..offset + self.block_bytes].copy_from_slice(block);
        }
        self.write_idx.store(idx + 1, Ordering::Release);
    }

    /// Read-only view of the slot holding block `idx`. Valid while the
    /// producer stays within `NUM_BUFF` blocks of `idx`.
    pub fn block(&self, idx: u64) -> &[u8] {
        let offset = (idx as usize % NUM_BUFF) * self.block_bytes;
        unsafe { &(&*self.slots.get())[offset..offset + self.block_bytes] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produced_block_reads_back() {
        let ring = ChannelRing::new(16);
        let block: Vec<u8> = (0..16).collect();
        ring.produce(&block);
        assert_eq!(ring.write_idx(), 1);
        assert_eq!(ring.block(0), &block[..]);
    }

    #[test]
    fn slots_are_addressed_by_the_low_counter_bits() {
        let ring = ChannelRing::new(4);
        for i in 0..NUM_BUFF as u8 {
            ring.produce(&[i; 4]);
        }
        for i in 0..NUM_BUFF as u64 {
            assert_eq!(ring.block(i), &[i as u8; 4]);
        }
    }

    #[test]
    fn producer_overrun_overwrites_the_oldest_slot() {
        let ring = ChannelRing::new(4);
        for i in 0..(NUM_BUFF as u8 + 1) {
            ring.produce(&[i; 4]);
        }
        assert_eq!(ring.write_idx(), NUM_BUFF as u64 + 1);
        // Block 0's slot now holds block NUM_BUFF
        assert_eq!(ring.block(0), &[NUM_BUFF as u8; 4]);
        assert_eq!(ring.block(NUM_BUFF as u64), &[NUM_BUFF as u8; 4]);
        // The rest are untouched
        assert_eq!(ring.block(1), &[1; 4]);
    }

    #[test]
    #[should_panic]
    fn produce_rejects_short_blocks() {
        let ring = ChannelRing::new(8);
        ring.produce(&[0u8; 4]);
    }
}
