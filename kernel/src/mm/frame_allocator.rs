//! Physical page-frame allocator.
//!
//! Two independent TLSF pools back all physical frame allocation: `low`
//! covers `[0, 1 MiB)` (needed for trampoline code and other SMP/early-boot
//! structures that must live at a real-mode-reachable physical address),
//! `high` covers everything above it. The two pools are never mixed:
//! `allocate_frame[s]` (`alloc4k`) draws only from `high` and
//! `allocate_low_frame[s]` (`lowAlloc4k`) draws only from `low`, so ordinary
//! high-memory consumers can never starve a caller that specifically needs
//! low memory. Both pools are seeded from the bootloader's memory map;
//! regions marked ACPI/bootloader-reclaimable are held out of the pools
//! until `reclaim_boot_regions()` is called once the kernel no longer needs
//! their original contents, mirroring the reference implementation's
//! staged admission of reclaimable memory.
//!
//! A small per-CPU cache (`PerCpuPageCache`) sits in front of the `high`
//! pool to avoid taking the pool's lock on every single-frame
//! allocate/free; it is purely a performance detail and is not part of
//! the allocator's external contract.

use spin::Mutex;

use crate::error::KernelError;
use crate::mm::{tlsf::TlsfPool, PhysicalAddress};

/// Size of a physical frame.
pub const FRAME_SIZE: usize = 4096;

/// Frames below this physical address come from the `low` pool.
const LOW_MEMORY_LIMIT: u64 = 1024 * 1024;

/// Physical frame number (address / FRAME_SIZE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameNumber(u64);

impl FrameNumber {
    pub const fn new(num: u64) -> Self {
        Self(num)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn as_addr(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 * FRAME_SIZE as u64)
    }
}

/// A single allocated physical frame, as handed to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalFrame {
    number: FrameNumber,
}

impl PhysicalFrame {
    pub const fn new(number: FrameNumber) -> Self {
        Self { number }
    }

    pub fn number(&self) -> FrameNumber {
        self.number
    }

    pub fn addr(&self) -> usize {
        self.number.as_addr().as_usize()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAllocatorError {
    OutOfMemory,
    InvalidFrame,
    InvalidSize,
    ReservedMemoryConflict,
}

impl From<FrameAllocatorError> for KernelError {
    fn from(err: FrameAllocatorError) -> Self {
        match err {
            FrameAllocatorError::OutOfMemory => KernelError::OutOfMemory {
                requested: 0,
                available: 0,
            },
            FrameAllocatorError::InvalidFrame | FrameAllocatorError::InvalidSize => {
                KernelError::InvalidArgument {
                    name: "frame",
                    value: "invalid",
                }
            }
            FrameAllocatorError::ReservedMemoryConflict => KernelError::ResourceExhausted {
                resource: "physical frames",
            },
        }
    }
}

/// A region of physical memory reported by the bootloader's memory map.
#[derive(Debug, Clone, Copy)]
pub struct BootMemoryRegion {
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
    pub kind: BootRegionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootRegionKind {
    Usable,
    AcpiReclaimable,
    BootloaderReclaimable,
    Reserved,
    BadMemory,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameAllocatorStats {
    pub total_frames: u64,
    pub free_frames: u64,
    pub reclaimable_frames: u64,
}

struct Pool {
    tlsf: TlsfPool,
    total_frames: u64,
}

impl Pool {
    fn new() -> Self {
        Self {
            tlsf: TlsfPool::new(),
            total_frames: 0,
        }
    }
}

pub struct FrameAllocator {
    low: Mutex<Pool>,
    high: Mutex<Pool>,
    reclaimable: Mutex<alloc::vec::Vec<(PhysicalAddress, PhysicalAddress)>>,
}

impl FrameAllocator {
    fn new() -> Self {
        Self {
            low: Mutex::new(Pool::new()),
            high: Mutex::new(Pool::new()),
            reclaimable: Mutex::new(alloc::vec::Vec::new()),
        }
    }

    fn pool_for(&self, frame: FrameNumber) -> &Mutex<Pool> {
        if frame.as_addr().as_u64() < LOW_MEMORY_LIMIT {
            &self.low
        } else {
            &self.high
        }
    }

    fn seed_region(&self, region: &BootMemoryRegion) {
        let start_frame = (region.start.as_u64() + FRAME_SIZE as u64 - 1) / FRAME_SIZE as u64;
        let end_frame = region.end.as_u64() / FRAME_SIZE as u64;
        if end_frame <= start_frame {
            return;
        }
        let len = end_frame - start_frame;

        match region.kind {
            BootRegionKind::Usable => {
                if start_frame * FRAME_SIZE as u64 < LOW_MEMORY_LIMIT {
                    let mut low = self.low.lock();
                    let split = (LOW_MEMORY_LIMIT / FRAME_SIZE as u64).min(end_frame);
                    if split > start_frame {
                        low.tlsf.seed(start_frame, split - start_frame);
                        low.total_frames += split - start_frame;
                    }
                    if end_frame > split {
                        let mut high = self.high.lock();
                        high.tlsf.seed(split, end_frame - split);
                        high.total_frames += end_frame - split;
                    }
                } else {
                    let mut high = self.high.lock();
                    high.tlsf.seed(start_frame, len);
                    high.total_frames += len;
                }
            }
            BootRegionKind::AcpiReclaimable | BootRegionKind::BootloaderReclaimable => {
                self.reclaimable.lock().push((region.start, region.end));
            }
            BootRegionKind::Reserved | BootRegionKind::BadMemory => {}
        }
    }

    /// Admit ACPI/bootloader-reclaimable regions into the general pools.
    /// Call once ACPI tables and the bootloader's own structures have been
    /// consumed and no longer need preserving.
    pub fn reclaim_boot_regions(&self) {
        let regions: alloc::vec::Vec<_> = self.reclaimable.lock().drain(..).collect();
        for (start, end) in regions {
            self.seed_region(&BootMemoryRegion {
                start,
                end,
                kind: BootRegionKind::Usable,
            });
        }
    }

    /// `alloc4k(1)`: a single frame from the `high` pool only. Never falls
    /// back to `low` — `low` is reserved for callers that specifically
    /// need a below-1-MiB address (trampoline/SMP bring-up code), and a
    /// silent fallback would let ordinary allocation starve them.
    pub fn allocate_frame(&self) -> Result<PhysicalFrame, FrameAllocatorError> {
        self.allocate_frames(1).map(|f| f[0])
    }

    /// `alloc4k(count)`: `count` contiguous frames from the `high` pool
    /// only. See [`Self::allocate_frame`] for why this never consults
    /// `low`.
    pub fn allocate_frames(
        &self,
        count: usize,
    ) -> Result<alloc::vec::Vec<PhysicalFrame>, FrameAllocatorError> {
        if count == 0 {
            return Err(FrameAllocatorError::InvalidSize);
        }
        let mut high = self.high.lock();
        if let Some(start) = high.tlsf.allocate(count as u64, 1) {
            return Ok((0..count as u64)
                .map(|i| PhysicalFrame::new(FrameNumber::new(start + i)))
                .collect());
        }
        Err(FrameAllocatorError::OutOfMemory)
    }

    /// `lowAlloc4k()`: a single frame from the below-1-MiB pool only, for
    /// trampoline code and other bring-up data that must live at a
    /// physical address reachable in real/unpaged mode. Never consults
    /// `high`.
    pub fn allocate_low_frame(&self) -> Result<PhysicalFrame, FrameAllocatorError> {
        self.allocate_low_frames(1).map(|f| f[0])
    }

    /// `count`-frame contiguous variant of [`Self::allocate_low_frame`].
    pub fn allocate_low_frames(
        &self,
        count: usize,
    ) -> Result<alloc::vec::Vec<PhysicalFrame>, FrameAllocatorError> {
        if count == 0 {
            return Err(FrameAllocatorError::InvalidSize);
        }
        let mut low = self.low.lock();
        if let Some(start) = low.tlsf.allocate(count as u64, 1) {
            return Ok((0..count as u64)
                .map(|i| PhysicalFrame::new(FrameNumber::new(start + i)))
                .collect());
        }
        Err(FrameAllocatorError::OutOfMemory)
    }

    /// Mark a specific physical range as used without going through
    /// `allocate`; used to carve out the kernel image and other
    /// boot-fixed regions before general allocation begins.
    pub fn mark_used(
        &self,
        start: PhysicalAddress,
        len: u64,
    ) -> Result<(), FrameAllocatorError> {
        let start_frame = start.as_frame().as_u64();
        let count = len.div_ceil(FRAME_SIZE as u64);
        let pool = self.pool_for(FrameNumber::new(start_frame));
        if pool.lock().tlsf.mark_used(start_frame, count) {
            Ok(())
        } else {
            Err(FrameAllocatorError::ReservedMemoryConflict)
        }
    }

    /// # Safety
    /// `frame` must have come from this allocator and must not still be
    /// referenced by any live mapping.
    pub unsafe fn free_frame(&self, frame: PhysicalFrame) {
        self.pool_for(frame.number())
            .lock()
            .tlsf
            .release(frame.number().as_u64(), 1);
    }

    /// # Safety
    /// See [`Self::free_frame`]; applies to every frame in `frames`.
    pub unsafe fn free_frames(&self, frames: &[PhysicalFrame]) {
        for frame in frames {
            self.free_frame(*frame);
        }
    }

    pub fn stats(&self) -> FrameAllocatorStats {
        let low = self.low.lock();
        let high = self.high.lock();
        FrameAllocatorStats {
            total_frames: low.total_frames + high.total_frames,
            free_frames: low.tlsf.total_free() + high.tlsf.total_free(),
            reclaimable_frames: 0,
        }
    }
}

/// On bare metal the real physmap offset is installed by `bootstrap`
/// before `mm::init` seeds this allocator from the boot-loader's memory
/// map. A host `cargo test` binary has no bootstrap stage and no real
/// physical memory to bootstrap that identity map from, but every test
/// that walks a `PageTables` (page-table frames are zeroed through the
/// physmap alias) needs `phys_to_virt_addr` to resolve to real, writable
/// memory. Leak a fixed arena once, on first touch of this allocator, and
/// point the physmap offset at it so "physical address 0x1000" on host
/// resolves to a real heap byte instead of a wild pointer; seed the
/// allocator's pools from that same range so every frame it ever hands
/// out falls inside the arena.
#[cfg(not(target_os = "none"))]
const HOST_TEST_ARENA_FRAMES: u64 = 32 * 1024;

#[cfg(not(target_os = "none"))]
fn seed_host_test_arena(allocator: &FrameAllocator) {
    let arena_bytes = HOST_TEST_ARENA_FRAMES as usize * FRAME_SIZE;
    let arena = alloc::vec![0u8; arena_bytes].into_boxed_slice();
    let base = alloc::boxed::Box::leak(arena).as_ptr() as u64;
    crate::mm::set_phys_mem_offset(base);
    allocator.seed_region(&BootMemoryRegion {
        start: PhysicalAddress::new(0),
        end: PhysicalAddress::new(arena_bytes as u64),
        kind: BootRegionKind::Usable,
    });
}

lazy_static::lazy_static! {
    pub static ref FRAME_ALLOCATOR: FrameAllocator = {
        let allocator = FrameAllocator::new();
        #[cfg(not(target_os = "none"))]
        seed_host_test_arena(&allocator);
        allocator
    };
}

pub fn init(memory_map: &[BootMemoryRegion]) {
    for region in memory_map {
        FRAME_ALLOCATOR.seed_region(region);
    }
}

pub fn allocate_frame() -> Result<PhysicalFrame, FrameAllocatorError> {
    per_cpu_alloc_frame()
}

/// `lowAlloc4k()`: bypasses the per-CPU cache (which only ever draws from
/// `high`) and allocates directly from the below-1-MiB pool.
pub fn allocate_low_frame() -> Result<PhysicalFrame, FrameAllocatorError> {
    FRAME_ALLOCATOR.allocate_low_frame()
}

/// # Safety
/// See [`FrameAllocator::free_frame`].
pub unsafe fn deallocate_frame(frame: PhysicalFrame) {
    per_cpu_free_frame(frame);
}

// ---------------------------------------------------------------------------
// Per-CPU single-frame cache
// ---------------------------------------------------------------------------

const CACHE_CAPACITY: usize = 64;
const LOW_WATERMARK: usize = 16;
const HIGH_WATERMARK: usize = 48;
const BATCH_SIZE: usize = 32;
const MAX_CPUS: usize = 16;

struct PerCpuPageCache {
    frames: [Option<PhysicalFrame>; CACHE_CAPACITY],
    count: usize,
}

impl PerCpuPageCache {
    const fn new() -> Self {
        Self {
            frames: [None; CACHE_CAPACITY],
            count: 0,
        }
    }

    fn alloc_one(&mut self) -> Option<PhysicalFrame> {
        if self.count == 0 {
            return None;
        }
        self.count -= 1;
        self.frames[self.count].take()
    }

    fn free_one(&mut self, frame: PhysicalFrame) -> bool {
        if self.count >= CACHE_CAPACITY {
            return false;
        }
        self.frames[self.count] = Some(frame);
        self.count += 1;
        true
    }

    fn needs_refill(&self) -> bool {
        self.count < LOW_WATERMARK
    }

    fn needs_drain(&self) -> bool {
        self.count > HIGH_WATERMARK
    }
}

static PER_CPU_PAGE_CACHES: Mutex<[PerCpuPageCache; MAX_CPUS]> = {
    const INIT: PerCpuPageCache = PerCpuPageCache::new();
    Mutex::new([INIT; MAX_CPUS])
};

fn cpu_id() -> usize {
    (crate::sched::smp::current_cpu_id() as usize) % MAX_CPUS
}

pub fn per_cpu_alloc_frame() -> Result<PhysicalFrame, FrameAllocatorError> {
    let cpu = cpu_id();
    let mut caches = PER_CPU_PAGE_CACHES.lock();
    if caches[cpu].needs_refill() {
        if let Ok(batch) = FRAME_ALLOCATOR.allocate_frames(BATCH_SIZE) {
            for frame in batch {
                caches[cpu].free_one(frame);
            }
        }
    }
    if let Some(frame) = caches[cpu].alloc_one() {
        return Ok(frame);
    }
    drop(caches);
    FRAME_ALLOCATOR.allocate_frame()
}

pub fn per_cpu_free_frame(frame: PhysicalFrame) {
    let cpu = cpu_id();
    let mut caches = PER_CPU_PAGE_CACHES.lock();
    if caches[cpu].needs_drain() {
        for _ in 0..BATCH_SIZE {
            if let Some(f) = caches[cpu].alloc_one() {
                drop(caches);
                unsafe { FRAME_ALLOCATOR.free_frame(f) };
                caches = PER_CPU_PAGE_CACHES.lock();
            }
        }
    }
    if !caches[cpu].free_one(frame) {
        drop(caches);
        unsafe { FRAME_ALLOCATOR.free_frame(frame) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_free_single_frame() {
        let allocator = FrameAllocator::new();
        allocator.seed_region(&BootMemoryRegion {
            start: PhysicalAddress::new(2 * 1024 * 1024),
            end: PhysicalAddress::new(4 * 1024 * 1024),
            kind: BootRegionKind::Usable,
        });
        let frame = allocator.allocate_frame().unwrap();
        assert!(frame.addr() >= 2 * 1024 * 1024);
        unsafe { allocator.free_frame(frame) };
        let stats = allocator.stats();
        assert_eq!(stats.free_frames, stats.total_frames);
    }

    #[test]
    fn reclaimable_regions_are_held_out_until_reclaimed() {
        let allocator = FrameAllocator::new();
        allocator.seed_region(&BootMemoryRegion {
            start: PhysicalAddress::new(2 * 1024 * 1024),
            end: PhysicalAddress::new(2 * 1024 * 1024 + FRAME_SIZE as u64),
            kind: BootRegionKind::AcpiReclaimable,
        });
        assert_eq!(allocator.stats().total_frames, 0);
        allocator.reclaim_boot_regions();
        assert_eq!(allocator.stats().total_frames, 1);
    }

    #[test]
    fn low_and_high_regions_split_at_1mib() {
        let allocator = FrameAllocator::new();
        allocator.seed_region(&BootMemoryRegion {
            start: PhysicalAddress::new(0),
            end: PhysicalAddress::new(2 * 1024 * 1024),
            kind: BootRegionKind::Usable,
        });
        assert!(allocator.low.lock().total_frames > 0);
        assert!(allocator.high.lock().total_frames > 0);
    }

    #[test]
    fn high_allocation_never_falls_back_to_low() {
        let allocator = FrameAllocator::new();
        allocator.seed_region(&BootMemoryRegion {
            start: PhysicalAddress::new(0),
            end: PhysicalAddress::new(FRAME_SIZE as u64),
            kind: BootRegionKind::Usable,
        });
        // Only the low pool has anything in it; `allocate_frame` must not
        // silently dip into it.
        assert_eq!(
            allocator.allocate_frame(),
            Err(FrameAllocatorError::OutOfMemory)
        );
        // But the dedicated low entry point can still reach that frame.
        let frame = allocator.allocate_low_frame().unwrap();
        assert!(frame.addr() < LOW_MEMORY_LIMIT as usize);
    }

    #[test]
    fn low_allocation_never_falls_back_to_high() {
        let allocator = FrameAllocator::new();
        allocator.seed_region(&BootMemoryRegion {
            start: PhysicalAddress::new(16 * 1024 * 1024),
            end: PhysicalAddress::new(16 * 1024 * 1024 + FRAME_SIZE as u64),
            kind: BootRegionKind::Usable,
        });
        assert_eq!(
            allocator.allocate_low_frame(),
            Err(FrameAllocatorError::OutOfMemory)
        );
        let frame = allocator.allocate_frame().unwrap();
        assert!(frame.addr() >= 16 * 1024 * 1024);
    }

    #[test]
    fn out_of_memory_when_exhausted() {
        let allocator = FrameAllocator::new();
        allocator.seed_region(&BootMemoryRegion {
            start: PhysicalAddress::new(16 * 1024 * 1024),
            end: PhysicalAddress::new(16 * 1024 * 1024 + FRAME_SIZE as u64),
            kind: BootRegionKind::Usable,
        });
        let _first = allocator.allocate_frame().unwrap();
        assert_eq!(
            allocator.allocate_frame(),
            Err(FrameAllocatorError::OutOfMemory)
        );
    }
}
