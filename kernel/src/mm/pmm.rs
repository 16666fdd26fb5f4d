//! Physical memory reference counting.
//!
//! [`frame_allocator`](super::frame_allocator) hands out raw frames but
//! knows nothing about sharing. This module layers a reference count on
//! top of every allocated frame so that copy-on-write address spaces can
//! share a frame safely: the frame is only returned to the allocator once
//! its count drops to zero.
//!
//! A freshly allocated frame starts at refcount 1. [`frame_inc_ref`] is
//! called once per additional address space that maps the frame (e.g. for
//! every child created by `fork`); [`free_frame`] decrements and only
//! frees the underlying frame when the count reaches zero.

#![allow(dead_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use spin::RwLock;

use super::{FrameNumber, FRAME_ALLOCATOR, FRAME_SIZE};

/// Aggregate PMM statistics, returned by [`pmm_info`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PmmInfo {
    pub total_frames: u64,
    pub free_frames: u64,
    pub tracked_frames: u64,
}

#[cfg(feature = "alloc")]
struct RefCountTable {
    /// Refcount per frame, indexed by frame number. Grown lazily as higher
    /// frame numbers are first touched.
    counts: RwLock<Vec<AtomicU32>>,
}

#[cfg(feature = "alloc")]
impl RefCountTable {
    const fn new() -> Self {
        Self {
            counts: RwLock::new(Vec::new()),
        }
    }

    fn ensure_capacity(&self, frame: FrameNumber) {
        let idx = frame.as_u64() as usize;
        if self.counts.read().len() > idx {
            return;
        }
        let mut counts = self.counts.write();
        while counts.len() <= idx {
            counts.push(AtomicU32::new(0));
        }
    }

    fn set(&self, frame: FrameNumber, value: u32) {
        self.ensure_capacity(frame);
        let counts = self.counts.read();
        counts[frame.as_u64() as usize].store(value, Ordering::Release);
    }

    fn inc(&self, frame: FrameNumber) -> u32 {
        self.ensure_capacity(frame);
        let counts = self.counts.read();
        counts[frame.as_u64() as usize].fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement and return the new count. Never underflows past zero.
    fn dec(&self, frame: FrameNumber) -> u32 {
        self.ensure_capacity(frame);
        let counts = self.counts.read();
        let slot = &counts[frame.as_u64() as usize];
        loop {
            let cur = slot.load(Ordering::Acquire);
            if cur == 0 {
                return 0;
            }
            if slot
                .compare_exchange(cur, cur - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return cur - 1;
            }
        }
    }

    fn get(&self, frame: FrameNumber) -> u32 {
        let idx = frame.as_u64() as usize;
        let counts = self.counts.read();
        if idx >= counts.len() {
            0
        } else {
            counts[idx].load(Ordering::Acquire)
        }
    }
}

#[cfg(feature = "alloc")]
static REFCOUNTS: RefCountTable = RefCountTable::new();

static TRACKED_FRAMES: AtomicUsize = AtomicUsize::new(0);

/// Prepare the refcount table. Cheap; the backing vector grows lazily.
pub fn init() {
    println!("[PMM] Frame reference counting initialized");
}

/// Allocate a single physical frame with an initial refcount of 1.
#[cfg(feature = "alloc")]
pub fn alloc_frame() -> Option<FrameNumber> {
    let frame = FRAME_ALLOCATOR.lock().allocate_frames(1, None).ok()?;
    REFCOUNTS.set(frame, 1);
    TRACKED_FRAMES.fetch_add(1, Ordering::Relaxed);
    Some(frame)
}

/// Drop one reference to `frame`. When the count reaches zero the frame
/// is returned to the physical frame allocator.
#[cfg(feature = "alloc")]
pub fn free_frame(frame: FrameNumber) {
    let remaining = REFCOUNTS.dec(frame);
    if remaining == 0 {
        let _ = FRAME_ALLOCATOR.lock().free_frames(frame, 1);
        TRACKED_FRAMES.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Add one reference to an already-allocated frame (e.g. when a COW fork
/// shares it with a child address space). Returns the new count.
#[cfg(feature = "alloc")]
pub fn frame_inc_ref(frame: FrameNumber) -> u32 {
    REFCOUNTS.inc(frame)
}

/// Current reference count for `frame` (0 if untracked).
#[cfg(feature = "alloc")]
pub fn frame_get_refcount(frame: FrameNumber) -> u32 {
    REFCOUNTS.get(frame)
}

#[cfg(not(feature = "alloc"))]
pub fn alloc_frame() -> Option<FrameNumber> {
    FRAME_ALLOCATOR.lock().allocate_frames(1, None).ok()
}

#[cfg(not(feature = "alloc"))]
pub fn free_frame(frame: FrameNumber) {
    let _ = FRAME_ALLOCATOR.lock().free_frames(frame, 1);
}

#[cfg(not(feature = "alloc"))]
pub fn frame_inc_ref(_frame: FrameNumber) -> u32 {
    1
}

#[cfg(not(feature = "alloc"))]
pub fn frame_get_refcount(_frame: FrameNumber) -> u32 {
    1
}

/// Snapshot of allocator-wide statistics.
pub fn pmm_info() -> PmmInfo {
    let stats = FRAME_ALLOCATOR.lock().get_stats();
    PmmInfo {
        total_frames: stats.total_frames,
        free_frames: stats.free_frames,
        tracked_frames: TRACKED_FRAMES.load(Ordering::Relaxed) as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "alloc")]
    #[test]
    fn test_refcount_lifecycle() {
        let frame = alloc_frame().expect("frame available");
        assert_eq!(frame_get_refcount(frame), 1);

        assert_eq!(frame_inc_ref(frame), 2);
        assert_eq!(frame_get_refcount(frame), 2);

        // First free just drops the child's reference.
        free_frame(frame);
        assert_eq!(frame_get_refcount(frame), 1);

        // Second free releases the frame back to the allocator.
        free_frame(frame);
        assert_eq!(frame_get_refcount(frame), 0);
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn test_untracked_frame_refcount_zero() {
        let frame = FrameNumber::new(999_999);
        assert_eq!(frame_get_refcount(frame), 0);
    }
}

const _: usize = FRAME_SIZE;
