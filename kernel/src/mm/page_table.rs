//! Four-level (PML4 → PDPT → PD → PT) page table manager for one address
//! space.
//!
//! [`PageTables`] owns the root table and a preallocated pool of
//! intermediate-table frames (`pteMemory`) handed to it at construction.
//! `map` stages its walk — counting how many new intermediate tables the
//! request would need — before touching a single entry, so a request that
//! would exhaust the pool leaves the tree untouched and reports exactly how
//! many extra frames were needed. `unmap` clears leaf entries and flushes
//! the TLB per page; intermediate tables are left in place, matching the
//! non-eager reclaim spec.

#![allow(dead_code)]

use core::ops::{Index, IndexMut};

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use spin::Mutex;

use super::frame_allocator::{PhysicalFrame, FRAME_ALLOCATOR};
use super::{FrameNumber, MemoryRange, PageFlags, PhysicalAddress, VirtualAddress, FRAME_SIZE};
use crate::error::KernelError;

/// Number of entries in a page table
pub const PAGE_TABLE_ENTRIES: usize = 512;

/// Page table entry
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct PageTableEntry {
    entry: u64,
}

impl PageTableEntry {
    /// Create an empty/unused entry
    pub const fn empty() -> Self {
        Self { entry: 0 }
    }

    /// Check if the entry is unused
    pub const fn is_unused(&self) -> bool {
        self.entry == 0
    }

    /// Check if the entry is present
    pub const fn is_present(&self) -> bool {
        self.entry & PageFlags::PRESENT.bits() != 0
    }

    /// Get the physical frame this entry points to
    pub fn frame(&self) -> Option<FrameNumber> {
        if self.is_present() {
            Some(FrameNumber::new((self.entry & 0x000F_FFFF_FFFF_F000) >> 12))
        } else {
            None
        }
    }

    /// Get the address this entry points to
    pub fn addr(&self) -> Option<PhysicalAddress> {
        self.frame().map(|f| PhysicalAddress::new(f.as_u64() << 12))
    }

    /// Get flags for this entry
    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.entry & (0xFFF | PageFlags::NO_EXECUTE.bits()))
    }

    /// Set this entry to map to a frame with given flags
    pub fn set(&mut self, frame: FrameNumber, flags: PageFlags) {
        self.entry = (frame.as_u64() << 12) | flags.bits();
    }

    /// Clear this entry
    pub fn clear(&mut self) {
        self.entry = 0;
    }
}

/// A page table with 512 entries
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; PAGE_TABLE_ENTRIES],
}

impl PageTable {
    /// Create a new empty page table
    pub const fn new() -> Self {
        Self {
            entries: [PageTableEntry::empty(); PAGE_TABLE_ENTRIES],
        }
    }

    /// Clear all entries
    pub fn zero(&mut self) {
        for entry in &mut self.entries {
            entry.clear();
        }
    }

    /// Get an iterator over all entries
    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for PageTable {
    type Output = PageTableEntry;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IndexMut<usize> for PageTable {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

impl Index<PageTableIndex> for PageTable {
    type Output = PageTableEntry;

    fn index(&self, index: PageTableIndex) -> &Self::Output {
        &self.entries[usize::from(index)]
    }
}

impl IndexMut<PageTableIndex> for PageTable {
    fn index_mut(&mut self, index: PageTableIndex) -> &mut Self::Output {
        &mut self.entries[usize::from(index)]
    }
}

/// An index into a page table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageTableIndex(u16);

impl PageTableIndex {
    /// Create a new index, panics if >= 512
    pub fn new(index: u16) -> Self {
        assert!(index < 512, "page table index out of bounds");
        Self(index)
    }

    /// Create a new index, truncates if >= 512
    pub const fn new_truncate(index: u16) -> Self {
        Self(index & 0x1FF)
    }
}

impl From<PageTableIndex> for usize {
    fn from(index: PageTableIndex) -> Self {
        index.0 as usize
    }
}

impl From<PageTableIndex> for u16 {
    fn from(index: PageTableIndex) -> Self {
        index.0
    }
}

/// Virtual address breakdown for 4-level paging
#[derive(Debug, Clone, Copy)]
pub struct VirtualAddressBreakdown {
    pub l4_index: PageTableIndex,
    pub l3_index: PageTableIndex,
    pub l2_index: PageTableIndex,
    pub l1_index: PageTableIndex,
    pub page_offset: u16,
}

impl VirtualAddressBreakdown {
    /// Break down a virtual address into page table indices
    pub fn new(addr: VirtualAddress) -> Self {
        let addr = addr.as_u64();
        Self {
            l4_index: PageTableIndex::new_truncate((addr >> 39) as u16),
            l3_index: PageTableIndex::new_truncate((addr >> 30) as u16),
            l2_index: PageTableIndex::new_truncate((addr >> 21) as u16),
            l1_index: PageTableIndex::new_truncate((addr >> 12) as u16),
            page_offset: (addr & 0xFFF) as u16,
        }
    }
}

/// Outcome of a [`PageTables::map`] call that the preallocated `pteMemory`
/// pool could not satisfy. The tree is left unchanged when this is
/// returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMappingResult {
    /// Total intermediate-table frames the request would have consumed.
    pub total_required: u64,
    /// How many more frames than currently available in the pool.
    pub extra_required: u64,
}

/// Preallocated, never-replenished pool of zeroed page-table frames.
///
/// Sized at construction so that mapping the entire user area with 4 KiB
/// pages cannot exhaust it below a documented threshold; frames are drawn
/// down as intermediate (L3/L2/L1) tables are created and are not returned
/// to the pool, since `PageTables::unmap` does not free intermediate
/// tables eagerly.
struct PtePool {
    frames: Vec<PhysicalAddress>,
}

impl PtePool {
    fn new(capacity: usize) -> Result<Self, KernelError> {
        let mut frames = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            let frame = FRAME_ALLOCATOR
                .allocate_frame()
                .map_err(|_| KernelError::OutOfMemory {
                    requested: (capacity * FRAME_SIZE) as u64,
                    available: 0,
                })?;
            let phys = frame.number().as_addr();
            zero_frame(phys);
            frames.push(phys);
        }
        Ok(Self { frames })
    }

    fn available(&self) -> usize {
        self.frames.len()
    }

    fn take(&mut self) -> Option<PhysicalAddress> {
        self.frames.pop()
    }
}

fn zero_frame(phys: PhysicalAddress) {
    let virt = super::phys_to_virt_addr(phys.as_u64()) as *mut u8;
    // SAFETY: `phys` was just returned by the frame allocator and is
    // reachable through the kernel's physical memory alias; nothing else
    // holds a reference to it yet.
    unsafe {
        core::ptr::write_bytes(virt, 0, FRAME_SIZE);
    }
}

/// One address space's four-level paging tree.
///
/// Mapping operations (`map`, `unmap`, `copy_higher_half_mappings`) are
/// serialized under `map_lock`; reads (`translate`, `get_memory_flags`) take
/// no lock and rely on the hardware `present` bit as their
/// happens-before marker, per spec's concurrency note for this component.
pub struct PageTables {
    root: PhysicalAddress,
    pte_pool: Mutex<PtePool>,
    map_lock: Mutex<()>,
}

impl PageTables {
    /// Allocate a fresh address space with `pte_budget` intermediate-table
    /// frames reserved up front (plus one for the L4 root itself).
    pub fn new(pte_budget: usize) -> Result<Self, KernelError> {
        let mut pool = PtePool::new(pte_budget + 1)?;
        let root = pool.take().expect("just allocated at least one frame");
        Ok(Self {
            root,
            pte_pool: Mutex::new(pool),
            map_lock: Mutex::new(()),
        })
    }

    /// Wrap an already-initialized root (e.g. the boot page tables) with no
    /// attached frame pool. Valid only as the source of
    /// `copy_higher_half_mappings`; `map`/`unmap` on this instance panic.
    pub fn from_existing_root(root: PhysicalAddress) -> Self {
        Self {
            root,
            pte_pool: Mutex::new(PtePool { frames: Vec::new() }),
            map_lock: Mutex::new(()),
        }
    }

    /// The page table hierarchy currently loaded into CR3.
    #[cfg(target_arch = "x86_64")]
    pub fn current() -> Self {
        use crate::arch::x86_64::mmu;
        Self::from_existing_root(mmu::read_cr3())
    }

    /// Physical address of the L4 (root) table, for programming CR3 when
    /// this address space is scheduled.
    pub const fn root_physical_address(&self) -> PhysicalAddress {
        self.root
    }

    fn root_table(&self) -> &PageTable {
        // SAFETY: `root` is a valid, exclusively-owned L4 frame reachable
        // through the kernel's physical memory alias for the lifetime of
        // `self`.
        unsafe { &*(super::phys_to_virt_addr(self.root.as_u64()) as *const PageTable) }
    }

    #[allow(clippy::mut_from_ref)]
    fn root_table_mut(&self) -> &mut PageTable {
        // SAFETY: mutation is serialized by `map_lock`, held by every
        // caller of this accessor.
        unsafe { &mut *(super::phys_to_virt_addr(self.root.as_u64()) as *mut PageTable) }
    }

    fn table_at(phys: PhysicalAddress) -> &'static PageTable {
        unsafe { &*(super::phys_to_virt_addr(phys.as_u64()) as *const PageTable) }
    }

    #[allow(clippy::mut_from_ref)]
    fn table_at_mut(phys: PhysicalAddress) -> &'static mut PageTable {
        unsafe { &mut *(super::phys_to_virt_addr(phys.as_u64()) as *mut PageTable) }
    }

    /// Count intermediate tables that would need to be newly allocated to
    /// map `pages` pages starting at `virt`, without mutating anything.
    fn count_missing_tables(&self, virt: VirtualAddress, pages: u64) -> u64 {
        let mut need_l3 = BTreeSet::new();
        let mut need_l2 = BTreeSet::new();
        let mut need_l1 = BTreeSet::new();

        let l4 = self.root_table();
        for i in 0..pages {
            let addr = VirtualAddress::new(virt.as_u64() + i * FRAME_SIZE as u64);
            let b = VirtualAddressBreakdown::new(addr);
            let l4i = u16::from(b.l4_index);
            let l4e = &l4[b.l4_index];
            if !l4e.is_present() {
                need_l3.insert(l4i);
                need_l2.insert((l4i, u16::from(b.l3_index)));
                need_l1.insert((l4i, u16::from(b.l3_index), u16::from(b.l2_index)));
                continue;
            }

            let l3 = Self::table_at(l4e.addr().unwrap());
            let l3i = u16::from(b.l3_index);
            let l3e = &l3[b.l3_index];
            if !l3e.is_present() {
                need_l2.insert((l4i, l3i));
                need_l1.insert((l4i, l3i, u16::from(b.l2_index)));
                continue;
            }

            let l2 = Self::table_at(l3e.addr().unwrap());
            let l2i = u16::from(b.l2_index);
            let l2e = &l2[b.l2_index];
            if !l2e.is_present() {
                need_l1.insert((l4i, l3i, l2i));
            }
        }

        (need_l3.len() + need_l2.len() + need_l1.len()) as u64
    }

    /// Create contiguous mappings `[virt, virt + size)` to `[phys, phys +
    /// size)`. On shortage of intermediate frames, returns a
    /// [`PageMappingResult`] and leaves the tree unchanged.
    pub fn map(
        &self,
        phys: PhysicalAddress,
        virt: VirtualAddress,
        size: u64,
        flags: PageFlags,
    ) -> Result<(), PageMappingResult> {
        debug_assert!(phys.is_aligned(FRAME_SIZE as u64));
        debug_assert!(virt.is_aligned(FRAME_SIZE as u64));
        let pages = size.div_ceil(FRAME_SIZE as u64);

        let _guard = self.map_lock.lock();

        let required = self.count_missing_tables(virt, pages);
        let available = self.pte_pool.lock().available() as u64;
        if required > available {
            return Err(PageMappingResult {
                total_required: required,
                extra_required: required - available,
            });
        }

        for i in 0..pages {
            let page_virt = VirtualAddress::new(virt.as_u64() + i * FRAME_SIZE as u64);
            let page_phys = PhysicalAddress::new(phys.as_u64() + i * FRAME_SIZE as u64);
            self.map_one(page_virt, page_phys, flags);
        }
        Ok(())
    }

    fn ensure_child(&self, entry: &mut PageTableEntry) -> PhysicalAddress {
        if !entry.is_present() {
            let frame = self
                .pte_pool
                .lock()
                .take()
                .expect("capacity verified by map() before mutation");
            entry.set(
                FrameNumber::new(frame.as_u64() / FRAME_SIZE as u64),
                PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
            );
        }
        entry.addr().unwrap()
    }

    fn map_one(&self, virt: VirtualAddress, phys: PhysicalAddress, flags: PageFlags) {
        let b = VirtualAddressBreakdown::new(virt);

        let l4 = self.root_table_mut();
        let l3_phys = self.ensure_child(&mut l4[b.l4_index]);

        let l3 = Self::table_at_mut(l3_phys);
        let l2_phys = self.ensure_child(&mut l3[b.l3_index]);

        let l2 = Self::table_at_mut(l2_phys);
        let l1_phys = self.ensure_child(&mut l2[b.l2_index]);

        let l1 = Self::table_at_mut(l1_phys);
        l1[b.l1_index].set(phys.as_frame(), flags | PageFlags::PRESENT);
    }

    /// Remove mappings in `range`. Issues `invlpg` for each page that was
    /// actually mapped. Intermediate tables are not freed.
    pub fn unmap(&self, range: MemoryRange<VirtualAddress>) {
        let _guard = self.map_lock.lock();
        let pages = range.size() / FRAME_SIZE as u64;
        for i in 0..pages {
            let virt = VirtualAddress::new(range.start.as_u64() + i * FRAME_SIZE as u64);
            if self.unmap_one(virt) {
                #[cfg(target_arch = "x86_64")]
                crate::arch::x86_64::mmu::invlpg(virt);
            }
        }
    }

    fn unmap_one(&self, virt: VirtualAddress) -> bool {
        let b = VirtualAddressBreakdown::new(virt);
        let l4 = self.root_table();
        let l4e = &l4[b.l4_index];
        let Some(l3_phys) = l4e.addr() else {
            return false;
        };

        let l3 = Self::table_at(l3_phys);
        let l3e = &l3[b.l3_index];
        let Some(l2_phys) = l3e.addr() else {
            return false;
        };

        let l2 = Self::table_at(l2_phys);
        let l2e = &l2[b.l2_index];
        let Some(l1_phys) = l2e.addr() else {
            return false;
        };

        let l1 = Self::table_at_mut(l1_phys);
        let entry = &mut l1[b.l1_index];
        if !entry.is_present() {
            return false;
        }
        entry.clear();
        true
    }

    /// Four-level walk; `None` if any level is non-present.
    pub fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        let b = VirtualAddressBreakdown::new(virt);
        let l4 = self.root_table();
        let l3_phys = l4[b.l4_index].addr()?;
        let l3 = Self::table_at(l3_phys);
        let l2_phys = l3[b.l3_index].addr()?;
        let l2 = Self::table_at(l2_phys);
        let l1_phys = l2[b.l2_index].addr()?;
        let l1 = Self::table_at(l1_phys);
        let frame = l1[b.l1_index].frame()?;
        Some(PhysicalAddress::new(
            (frame.as_u64() << 12) | b.page_offset as u64,
        ))
    }

    /// Intersection of flags along the walk; `None` if unmapped.
    pub fn get_memory_flags(&self, virt: VirtualAddress) -> Option<PageFlags> {
        let b = VirtualAddressBreakdown::new(virt);
        let l4 = self.root_table();
        let l4e = &l4[b.l4_index];
        if !l4e.is_present() {
            return None;
        }
        let l3 = Self::table_at(l4e.addr().unwrap());
        let l3e = &l3[b.l3_index];
        if !l3e.is_present() {
            return None;
        }
        let l2 = Self::table_at(l3e.addr().unwrap());
        let l2e = &l2[b.l2_index];
        if !l2e.is_present() {
            return None;
        }
        let l1 = Self::table_at(l2e.addr().unwrap());
        let l1e = &l1[b.l1_index];
        if !l1e.is_present() {
            return None;
        }
        Some(l4e.flags() & l3e.flags() & l2e.flags() & l1e.flags())
    }

    /// Share kernel mappings at process creation: copy the upper-half L4
    /// entries (indices 256..512) from `from` into `self`.
    pub fn copy_higher_half_mappings(&self, from: &PageTables) {
        let _guard = self.map_lock.lock();
        let src = from.root_table();
        let dst = self.root_table_mut();
        for i in 256..PAGE_TABLE_ENTRIES {
            if src[i].is_present() {
                dst[i] = src[i];
            }
        }
    }

    /// Debug helper: every currently-mapped page, coalesced into
    /// contiguous ranges. Not part of the operational surface; used by
    /// tests to assert on the shape of a mapping.
    pub fn iter_mapped_ranges(&self) -> Vec<MemoryRange<VirtualAddress>> {
        let mut pages = Vec::new();
        let l4 = self.root_table();
        for l4i in 0..PAGE_TABLE_ENTRIES {
            let l4e = &l4[l4i];
            let Some(l3_phys) = l4e.addr() else { continue };
            let l3 = Self::table_at(l3_phys);
            for l3i in 0..PAGE_TABLE_ENTRIES {
                let l3e = &l3[l3i];
                let Some(l2_phys) = l3e.addr() else { continue };
                let l2 = Self::table_at(l2_phys);
                for l2i in 0..PAGE_TABLE_ENTRIES {
                    let l2e = &l2[l2i];
                    let Some(l1_phys) = l2e.addr() else { continue };
                    let l1 = Self::table_at(l1_phys);
                    for l1i in 0..PAGE_TABLE_ENTRIES {
                        if l1[l1i].is_present() {
                            let addr = ((l4i as u64) << 39)
                                | ((l3i as u64) << 30)
                                | ((l2i as u64) << 21)
                                | ((l1i as u64) << 12);
                            pages.push(addr);
                        }
                    }
                }
            }
        }

        pages.sort_unstable();
        let mut ranges: Vec<MemoryRange<VirtualAddress>> = Vec::new();
        for addr in pages {
            if let Some(r) = ranges.last_mut() {
                if r.end.as_u64() == addr {
                    r.end = VirtualAddress::new(addr + FRAME_SIZE as u64);
                    continue;
                }
            }
            ranges.push(MemoryRange::new_virt(
                VirtualAddress::new(addr),
                VirtualAddress::new(addr + FRAME_SIZE as u64),
            ));
        }
        ranges
    }
}

impl Drop for PageTables {
    fn drop(&mut self) {
        // Only the reserve frames that were never drawn into the tree are
        // reclaimed here; frames already built into the paging tree are
        // freed by the process teardown path once this address space is no
        // longer the active one.
        let mut pool = self.pte_pool.lock();
        while let Some(frame) = pool.take() {
            // SAFETY: these frames were never installed into any page
            // table entry, so nothing references them.
            unsafe {
                FRAME_ALLOCATOR.free_frame(PhysicalFrame::new(FrameNumber::new(
                    frame.as_u64() / FRAME_SIZE as u64,
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_round_trips_through_indices() {
        let addr = VirtualAddress::new(0x0000_7fff_1234_5000);
        let b = VirtualAddressBreakdown::new(addr);
        let rebuilt = (u16::from(b.l4_index) as u64) << 39
            | (u16::from(b.l3_index) as u64) << 30
            | (u16::from(b.l2_index) as u64) << 21
            | (u16::from(b.l1_index) as u64) << 12
            | b.page_offset as u64;
        assert_eq!(rebuilt, addr.as_u64());
    }

    #[test]
    fn page_table_entry_round_trips_frame_and_flags() {
        let mut entry = PageTableEntry::empty();
        assert!(entry.is_unused());
        entry.set(FrameNumber::new(42), PageFlags::PRESENT | PageFlags::WRITABLE);
        assert!(entry.is_present());
        assert_eq!(entry.frame().unwrap().as_u64(), 42);
        assert!(entry.flags().contains(PageFlags::WRITABLE));
    }

    #[test]
    fn copy_higher_half_mappings_shares_upper_entries_only() {
        let system = PageTables::new(4).unwrap();
        system
            .map(
                PhysicalAddress::new(0x10_0000),
                VirtualAddress::new(0xffff_8000_0000_0000),
                FRAME_SIZE as u64,
                PageFlags::PRESENT | PageFlags::WRITABLE,
            )
            .unwrap();

        let process = PageTables::new(4).unwrap();
        // Lower half mapping present only in `process`, never shared up.
        process
            .map(
                PhysicalAddress::new(0x20_0000),
                VirtualAddress::new(0x1000),
                FRAME_SIZE as u64,
                PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
            )
            .unwrap();

        assert!(process.translate(VirtualAddress::new(0xffff_8000_0000_0000)).is_none());

        process.copy_higher_half_mappings(&system);

        assert_eq!(
            process.translate(VirtualAddress::new(0xffff_8000_0000_0000)),
            Some(PhysicalAddress::new(0x10_0000))
        );
        assert_eq!(
            process.translate(VirtualAddress::new(0x1000)),
            Some(PhysicalAddress::new(0x20_0000))
        );
    }
}
