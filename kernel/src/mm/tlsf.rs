//! Generic TLSF-style segregated-fit range allocator.
//!
//! A single engine shared by the physical frame allocator
//! (`super::frame_allocator`) and the virtual range allocator
//! (`super::virt_alloc`): both manage a disjoint set of free integer
//! ranges (frame numbers or page indices) and both want O(1)-ish
//! allocation from a size-appropriate free list plus low-fragmentation
//! coalescing on release.
//!
//! This is a simplified, single-level segregated fit: free ranges are
//! bucketed into power-of-two size classes (`class = floor(log2(len))`),
//! each class holding its own free list, so allocation only searches
//! classes at or above the requested size instead of walking one global
//! list. Classic TLSF additionally subdivides each class into a second
//! level to bound search within a class to O(1); that refinement isn't
//! needed here because each class list is a `Vec`, not a linked list
//! walked pointer-by-pointer, so even an unsplit class is a single
//! `pop()`. Coalescing neighbors on release is done through an
//! address-ordered map of free ranges rather than embedded boundary tags,
//! since the ranges managed here do not always have accessible backing
//! storage (virtual reservations have none at all).
//!
//! All units are caller-defined (frame numbers, page indices); the engine
//! itself only ever sees `u64` start/length pairs.

use alloc::{collections::BTreeMap, vec::Vec};

/// Number of size classes; class `i` covers lengths in `[2^i, 2^(i+1))`.
/// 48 classes comfortably covers any 64-bit length in page units.
const NUM_CLASSES: usize = 48;

fn size_class(len: u64) -> usize {
    debug_assert!(len > 0);
    let class = 63 - len.leading_zeros();
    (class as usize).min(NUM_CLASSES - 1)
}

/// A contiguous free range `[start, start + len)` in caller-defined units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub len: u64,
}

impl Range {
    fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Segregated-fit free list over a set of disjoint ranges.
pub struct TlsfPool {
    /// Free ranges bucketed by size class, for near-O(1) "first sufficient
    /// class" allocation.
    classes: Vec<Vec<Range>>,
    /// All free ranges keyed by start, for O(log n) neighbor lookup when
    /// coalescing on release.
    by_start: BTreeMap<u64, u64>,
    total_free: u64,
}

impl TlsfPool {
    pub fn new() -> Self {
        let mut classes = Vec::with_capacity(NUM_CLASSES);
        for _ in 0..NUM_CLASSES {
            classes.push(Vec::new());
        }
        Self {
            classes,
            by_start: BTreeMap::new(),
            total_free: 0,
        }
    }

    pub fn total_free(&self) -> u64 {
        self.total_free
    }

    /// Seed the pool with an initial free range. Used once at construction
    /// time per zone; not intended as a general insert (use `release` for
    /// that, which also coalesces).
    pub fn seed(&mut self, start: u64, len: u64) {
        if len == 0 {
            return;
        }
        self.insert_range(Range { start, len });
    }

    fn insert_range(&mut self, range: Range) {
        self.total_free += range.len;
        self.by_start.insert(range.start, range.len);
        self.classes[size_class(range.len)].push(range);
    }

    fn remove_from_class(&mut self, range: Range) {
        let class = &mut self.classes[size_class(range.len)];
        if let Some(pos) = class.iter().position(|r| *r == range) {
            class.swap_remove(pos);
        }
    }

    /// Allocate a range of exactly `len` units, aligned to `align` units
    /// (must be a power of two). Returns the start of the allocated range.
    pub fn allocate(&mut self, len: u64, align: u64) -> Option<u64> {
        if len == 0 {
            return None;
        }
        debug_assert!(align.is_power_of_two());

        let min_class = size_class(len);
        for class in min_class..NUM_CLASSES {
            // A class holds ranges >= 2^class, but not all of them satisfy
            // alignment; scan the (typically short) class list for the
            // first range that fits once aligned.
            let found = self.classes[class].iter().enumerate().find_map(|(i, r)| {
                let aligned_start = align_up(r.start, align);
                let waste = aligned_start - r.start;
                if waste < r.len && r.len - waste >= len {
                    Some((i, *r, aligned_start))
                } else {
                    None
                }
            });

            if let Some((index, range, aligned_start)) = found {
                self.classes[class].swap_remove(index);
                self.by_start.remove(&range.start);
                self.total_free -= range.len;

                // Return the unused head (alignment padding) and tail to
                // the free pool.
                if aligned_start > range.start {
                    self.insert_range(Range {
                        start: range.start,
                        len: aligned_start - range.start,
                    });
                }
                let tail_start = aligned_start + len;
                if tail_start < range.end() {
                    self.insert_range(Range {
                        start: tail_start,
                        len: range.end() - tail_start,
                    });
                }
                return Some(aligned_start);
            }
        }
        None
    }

    /// Mark `[start, start+len)` used, splitting or removing whichever
    /// free range currently covers it. Used to carve out boot-reserved
    /// regions before any allocation happens. Returns `false` if the
    /// range is not (entirely) free.
    pub fn mark_used(&mut self, start: u64, len: u64) -> bool {
        if len == 0 {
            return true;
        }
        let end = start + len;
        let covering = self
            .by_start
            .range(..=start)
            .next_back()
            .map(|(&s, &l)| (s, l))
            .filter(|(s, l)| *s <= start && start + len <= s + l);

        let Some((range_start, range_len)) = covering else {
            return false;
        };
        let range = Range {
            start: range_start,
            len: range_len,
        };
        self.remove_from_class(range);
        self.by_start.remove(&range_start);
        self.total_free -= range_len;

        if range_start < start {
            self.insert_range(Range {
                start: range_start,
                len: start - range_start,
            });
        }
        if end < range_start + range_len {
            self.insert_range(Range {
                start: end,
                len: range_start + range_len - end,
            });
        }
        true
    }

    /// Release `[start, start+len)` back to the pool, coalescing with
    /// adjacent free neighbors.
    pub fn release(&mut self, start: u64, len: u64) {
        if len == 0 {
            return;
        }
        let mut merged_start = start;
        let mut merged_len = len;

        // Merge with the preceding neighbor if it ends exactly at `start`.
        if let Some((&prev_start, &prev_len)) = self.by_start.range(..start).next_back() {
            if prev_start + prev_len == start {
                self.remove_from_class(Range {
                    start: prev_start,
                    len: prev_len,
                });
                self.by_start.remove(&prev_start);
                self.total_free -= prev_len;
                merged_start = prev_start;
                merged_len += prev_len;
            }
        }

        // Merge with the following neighbor if it starts exactly where
        // the merged range ends.
        let merged_end = merged_start + merged_len;
        if let Some((&next_start, &next_len)) = self.by_start.range(merged_end..).next() {
            if next_start == merged_end {
                self.remove_from_class(Range {
                    start: next_start,
                    len: next_len,
                });
                self.by_start.remove(&next_start);
                self.total_free -= next_len;
                merged_len += next_len;
            }
        }

        self.insert_range(Range {
            start: merged_start,
            len: merged_len,
        });
    }
}

impl Default for TlsfPool {
    fn default() -> Self {
        Self::new()
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_free_round_trip() {
        let mut pool = TlsfPool::new();
        pool.seed(0, 1024);
        let a = pool.allocate(16, 1).unwrap();
        let b = pool.allocate(16, 1).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.total_free(), 1024 - 32);
        pool.release(a, 16);
        pool.release(b, 16);
        assert_eq!(pool.total_free(), 1024);
    }

    #[test]
    fn coalesces_adjacent_releases() {
        let mut pool = TlsfPool::new();
        pool.seed(0, 64);
        let a = pool.allocate(64, 1).unwrap();
        pool.release(a, 32);
        pool.release(a + 32, 32);
        // Fully coalesced back into one 64-length range.
        let whole = pool.allocate(64, 1);
        assert!(whole.is_some());
    }

    #[test]
    fn alignment_is_respected() {
        let mut pool = TlsfPool::new();
        pool.seed(1, 256);
        let addr = pool.allocate(16, 16).unwrap();
        assert_eq!(addr % 16, 0);
    }

    #[test]
    fn mark_used_splits_free_range() {
        let mut pool = TlsfPool::new();
        pool.seed(0, 100);
        assert!(pool.mark_used(40, 10));
        assert_eq!(pool.total_free(), 90);
        // The reserved hole must not be handed out.
        for _ in 0..20 {
            let addr = pool.allocate(1, 1);
            if let Some(a) = addr {
                assert!(a < 40 || a >= 50);
            }
        }
    }

    #[test]
    fn out_of_space_returns_none() {
        let mut pool = TlsfPool::new();
        pool.seed(0, 4);
        assert!(pool.allocate(5, 1).is_none());
    }
}
