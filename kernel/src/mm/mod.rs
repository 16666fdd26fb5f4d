//! Memory management
//!
//! Owns the physical frame allocator, per-process virtual address spaces,
//! the kernel heap, and the page fault dispatcher. The physical/virtual
//! split follows a classic PMM/VMM layering: [`frame_allocator`] hands out
//! raw frames, [`pmm`] adds reference counting on top for copy-on-write
//! sharing, [`page_table`] and [`vmm`] manipulate the hardware page tables,
//! and [`vas`] tracks per-process mapping metadata (heap break, mmap
//! regions, stack).

#![allow(dead_code)]

use core::sync::atomic::{AtomicU64, Ordering};

pub mod bootloader;
pub mod demand_paging;
pub mod frame_allocator;
pub mod heap;
pub mod page_fault;
pub mod page_table;
pub mod pmm;
pub mod user_validation;
pub mod vas;
pub mod vmm;

pub use frame_allocator::{
    FrameAllocator, FrameAllocatorError, FrameNumber, MemoryZone, PhysicalAddress, FRAME_ALLOCATOR,
    FRAME_SIZE,
};
pub use pmm::{alloc_frame, free_frame, frame_get_refcount, frame_inc_ref, pmm_info, PmmInfo};

/// Page size in bytes (4 KiB on every architecture this kernel targets).
pub const PAGE_SIZE: usize = FRAME_SIZE;

/// Virtual memory address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualAddress(pub u64);

impl VirtualAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub fn add(&self, offset: usize) -> Self {
        Self(self.0 + offset as u64)
    }

    pub const fn page_align_down(&self) -> Self {
        Self(self.0 & !(PAGE_SIZE as u64 - 1))
    }

    pub const fn page_offset(&self) -> usize {
        (self.0 & (PAGE_SIZE as u64 - 1)) as usize
    }
}

/// Page size options for architectures that support large/huge pages.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    /// 4 KiB pages
    Small = 4096,
    /// 2 MiB pages (x86_64) / 2 MiB (AArch64)
    Large = 2 * 1024 * 1024,
    /// 1 GiB pages (x86_64) / 1 GiB (AArch64)
    Huge = 1024 * 1024 * 1024,
}

/// Page table entry flags, modeled on the x86 PTE bit layout.
///
/// Bits 9-11 are "available for software use" on real x86 page table
/// entries, which is where [`PageFlags::COW`] lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFlags(pub(crate) u64);

impl PageFlags {
    pub const PRESENT: Self = Self(1 << 0);
    pub const WRITABLE: Self = Self(1 << 1);
    pub const USER: Self = Self(1 << 2);
    pub const WRITE_THROUGH: Self = Self(1 << 3);
    pub const NO_CACHE: Self = Self(1 << 4);
    pub const ACCESSED: Self = Self(1 << 5);
    pub const DIRTY: Self = Self(1 << 6);
    pub const HUGE: Self = Self(1 << 7);
    pub const GLOBAL: Self = Self(1 << 8);
    /// Software bit: page is copy-on-write. Mapped read-only in hardware;
    /// a write fault triggers [`page_fault`]'s COW handler.
    pub const COW: Self = Self(1 << 9);
    pub const NO_EXECUTE: Self = Self(1 << 63);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn remove(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn insert(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }
}

impl core::ops::BitOr for PageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitAnd for PageFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl core::ops::BitOrAssign for PageFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl core::ops::BitAndAssign for PageFlags {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

/// A region of physical memory discovered at boot (from the memory map
/// handed to the kernel by the bootloader / Multiboot info).
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub start: u64,
    pub size: u64,
    pub usable: bool,
}

/// Offset added to a physical address to obtain its kernel virtual alias.
///
/// The kernel maps all usable physical memory once, at boot, starting at
/// this offset (the "physmap"). Every other address space shares this
/// mapping so that kernel code can always dereference a physical address
/// without needing to switch page tables.
pub static PHYS_MEM_OFFSET: AtomicU64 = AtomicU64::new(0);

/// Set the physmap offset. Called once during early boot.
pub fn set_phys_mem_offset(offset: u64) {
    PHYS_MEM_OFFSET.store(offset, Ordering::Release);
}

/// Translate a physical address to its kernel-virtual alias.
pub fn phys_to_virt_addr(phys: u64) -> u64 {
    phys + PHYS_MEM_OFFSET.load(Ordering::Acquire)
}

/// Initialize memory management: frame allocator, refcount table, heap,
/// and demand-paging/COW bookkeeping.
pub fn init(regions: &[MemoryRegion]) {
    println!("[MM] Initializing memory management...");

    let mut allocator = FRAME_ALLOCATOR.lock();
    let mut node = 0usize;
    for region in regions {
        if !region.usable {
            continue;
        }
        let start_frame = FrameNumber::new(region.start / FRAME_SIZE as u64);
        let frame_count = (region.size / FRAME_SIZE as u64) as usize;
        if frame_count == 0 {
            continue;
        }
        let _ = allocator.init_numa_node(node, start_frame, frame_count);
        node += 1;
    }
    #[cfg(feature = "alloc")]
    allocator.mark_standard_reserved_regions();
    drop(allocator);

    pmm::init();

    #[cfg(feature = "alloc")]
    demand_paging::init();

    println!("[MM] Memory management initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_address_page_align() {
        let v = VirtualAddress::new(0x1234);
        assert_eq!(v.page_align_down().as_u64(), 0x1000);
        assert_eq!(v.page_offset(), 0x234);
    }

    #[test]
    fn test_page_flags_cow_bit_distinct() {
        let f = PageFlags::PRESENT | PageFlags::COW;
        assert!(f.contains(PageFlags::PRESENT));
        assert!(f.contains(PageFlags::COW));
        assert!(!f.contains(PageFlags::WRITABLE));

        let cleared = f.remove(PageFlags::COW).insert(PageFlags::WRITABLE);
        assert!(!cleared.contains(PageFlags::COW));
        assert!(cleared.contains(PageFlags::WRITABLE));
    }
}
