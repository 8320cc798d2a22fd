//! Physical and virtual memory management.
//!
//! Layering (bottom to top): [`frame_allocator`] hands out physical page
//! frames from two TLSF pools (low/high); [`virt_alloc`] hands out virtual
//! address ranges from four TLSF pools (supervisor/user x 4k/2m);
//! [`page_table`] walks and edits the x86_64 4-level page table hierarchy
//! that ties a virtual range to physical frames. `crate::process::Process`
//! owns one [`page_table::PageTables`] and one [`VirtualAllocator`]
//! directly rather than through an intermediate address-space wrapper.

pub mod frame_allocator;
pub mod page_table;
pub mod tlsf;
pub mod virt_alloc;

use core::sync::atomic::{AtomicU64, Ordering};

pub use frame_allocator::{FrameAllocatorError, FrameNumber, FRAME_SIZE};
pub use page_table::{PageMappingResult, PageTables};
pub use virt_alloc::VirtualAllocator;

/// Physical memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalAddress(pub u64);

impl PhysicalAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub const fn as_frame(&self) -> FrameNumber {
        FrameNumber::new(self.0 / FRAME_SIZE as u64)
    }

    pub const fn offset(&self, offset: u64) -> Self {
        Self(self.0 + offset)
    }

    pub const fn is_aligned(&self, align: u64) -> bool {
        self.0 & (align - 1) == 0
    }
}

/// Virtual memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
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

    pub const fn add(&self, offset: usize) -> Self {
        Self(self.0 + offset as u64)
    }

    pub const fn is_aligned(&self, align: u64) -> bool {
        self.0 & (align - 1) == 0
    }

    /// Is this a valid canonical (sign-extended 48-bit) address.
    pub const fn is_canonical(&self) -> bool {
        let top17 = self.0 >> 47;
        top17 == 0 || top17 == 0x1_ffff
    }
}

/// A half-open `[start, end)` range over a comparable address kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange<A> {
    pub start: A,
    pub end: A,
}

impl MemoryRange<PhysicalAddress> {
    pub const fn new_phys(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self { start, end }
    }

    pub const fn size(&self) -> u64 {
        self.end.0 - self.start.0
    }

    pub const fn contains(&self, addr: PhysicalAddress) -> bool {
        self.start.0 <= addr.0 && addr.0 < self.end.0
    }

    pub const fn overlaps(&self, other: &Self) -> bool {
        self.end.0 > other.start.0 && other.end.0 > self.start.0
    }

    pub fn is_page_aligned(&self) -> bool {
        self.start.is_aligned(FRAME_SIZE as u64) && self.end.is_aligned(FRAME_SIZE as u64)
    }
}

impl MemoryRange<VirtualAddress> {
    pub const fn new_virt(start: VirtualAddress, end: VirtualAddress) -> Self {
        Self { start, end }
    }

    pub const fn size(&self) -> u64 {
        self.end.0 - self.start.0
    }

    pub const fn contains(&self, addr: VirtualAddress) -> bool {
        self.start.0 <= addr.0 && addr.0 < self.end.0
    }

    pub const fn overlaps(&self, other: &Self) -> bool {
        self.end.0 > other.start.0 && other.end.0 > self.start.0
    }

    pub fn is_page_aligned(&self) -> bool {
        self.start.is_aligned(FRAME_SIZE as u64) && self.end.is_aligned(FRAME_SIZE as u64)
    }
}

bitflags::bitflags! {
    /// Page-table entry flags, independent of the raw x86_64 PTE bit layout
    /// used by [`page_table`] (this is the caller-facing request surface;
    /// `page_table` translates it to hardware bits).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE      = 1 << 4;
        const HUGE          = 1 << 7;
        const GLOBAL        = 1 << 8;
        const NO_EXECUTE    = 1 << 63;
    }
}

/// Base virtual address of the identity map of all physical memory,
/// established by `bootstrap` before any other mm code runs. Frame
/// metadata and page-table walks dereference physical addresses through
/// this offset rather than assuming identity mapping.
pub static PHYS_MEM_OFFSET: AtomicU64 = AtomicU64::new(0);

pub fn set_phys_mem_offset(offset: u64) {
    PHYS_MEM_OFFSET.store(offset, Ordering::Release);
}

/// Translate a physical address to its kernel virtual alias.
pub fn phys_to_virt_addr(phys: u64) -> u64 {
    phys + PHYS_MEM_OFFSET.load(Ordering::Acquire)
}

/// Translate a kernel virtual alias address back to physical.
pub fn virt_to_phys_addr(virt: u64) -> u64 {
    virt - PHYS_MEM_OFFSET.load(Ordering::Acquire)
}

/// Top of the canonical supervisor-half virtual address space, 1 GiB below
/// the top of the 48-bit canonical range, leaving room for a fixmap region
/// above it if one is added later.
pub const KERNEL_SPACE_BASE: u64 = 0xffff_8000_0000_0000;

/// Size threshold above which the virtual allocator serves a request from
/// its 2 MiB TLSF pool instead of the 4 KiB one.
pub const LARGE_PAGE_SIZE: u64 = 2 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_contains_is_half_open() {
        let r = MemoryRange::new_phys(PhysicalAddress::new(0x1000), PhysicalAddress::new(0x2000));
        assert!(r.contains(PhysicalAddress::new(0x1000)));
        assert!(r.contains(PhysicalAddress::new(0x1fff)));
        assert!(!r.contains(PhysicalAddress::new(0x2000)));
        assert_eq!(r.size(), 0x1000);
    }

    #[test]
    fn overlap_iff_intersection_nonempty() {
        let a = MemoryRange::new_virt(VirtualAddress::new(0), VirtualAddress::new(0x3000));
        let b = MemoryRange::new_virt(VirtualAddress::new(0x2000), VirtualAddress::new(0x4000));
        let c = MemoryRange::new_virt(VirtualAddress::new(0x3000), VirtualAddress::new(0x4000));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn page_alignment_requires_both_endpoints() {
        let aligned =
            MemoryRange::new_phys(PhysicalAddress::new(0x1000), PhysicalAddress::new(0x3000));
        let misaligned =
            MemoryRange::new_phys(PhysicalAddress::new(0x1000), PhysicalAddress::new(0x3001));
        assert!(aligned.is_page_aligned());
        assert!(!misaligned.is_page_aligned());
    }
}

pub fn init(memory_map: &[frame_allocator::BootMemoryRegion]) {
    frame_allocator::init(memory_map);
    log::info!("mm: physical frame allocator online");
}

/// The kernel's own page-table root, installed once at boot. Every
/// process's [`PageTables`] shares the upper half of its address space with
/// this one via [`PageTables::copy_higher_half_mappings`] (spec §4.7 step 4).
static SYSTEM_PAGE_TABLES: crate::sync::once_lock::OnceLock<PageTables> =
    crate::sync::once_lock::OnceLock::new();

/// Record `tables` as the system-wide page tables shared by every process.
/// Called exactly once, from architecture bring-up, before the first
/// process is created.
pub fn set_system_page_tables(tables: PageTables) {
    SYSTEM_PAGE_TABLES
        .set(tables)
        .unwrap_or_else(|_| panic!("system page tables already installed"));
}

/// The kernel's own page-table root, if architecture bring-up has installed
/// one yet.
pub fn system_page_tables() -> Option<&'static PageTables> {
    SYSTEM_PAGE_TABLES.get()
}
