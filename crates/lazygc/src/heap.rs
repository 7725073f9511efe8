//! The region/reference registry and every public heap operation.
//!
//! A [`Heap`] owns two slot arenas — one for regions (byte buffers plus a
//! live-reference count) and one for reference nodes — and threads each
//! arena's live slots into an intrusive doubly-linked list by index. Lists
//! give O(1) head insertion and O(1) unlink; the arenas give stable,
//! generation-checked handles, so a stale [`RefId`] is a lookup failure
//! rather than undefined behavior.
//!
//! Reclamation is deferred: [`Heap::free`] only drops a region's count.
//! Regions are actually released by [`Heap::collect`], which runs either
//! explicitly or automatically when the per-heap countdown (reseeded to a
//! random value in `1..=10` after each automatic sweep) reaches zero.
//!
//! # Failure model
//!
//! Caller mistakes — null or stale handles, out-of-bounds copies,
//! allocation exhaustion — are reported by sentinel returns (`None`, `0`)
//! and never mutate the heap. A mutually inconsistent sibling link found
//! during unlink is a logic bug inside this crate and panics: the registry
//! cannot make safe forward progress once its lists disagree.

use std::io::{self, Write};
use std::ptr::NonNull;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::rng::XorShift64Star;
use crate::slab::{Slab, SlotId};

/// Smallest value the automatic-sweep countdown is reseeded to.
const SWEEP_COUNTDOWN_MIN: u32 = 1;

/// Largest value the automatic-sweep countdown is reseeded to.
///
/// Sweep cost is proportional to the live region count, amortized across
/// roughly this many frees on average.
const SWEEP_COUNTDOWN_MAX: u32 = 10;

// ── Handles ──────────────────────────────────────────────────────────────────

/// A counted handle to one region.
///
/// `RefId` is `Copy`: copying it does NOT create a new reference or touch
/// any count — use [`Heap::clone_ref`] for that. A copy that outlives its
/// reference (freed via another copy, or wiped by [`Heap::reset`]) becomes
/// stale and fails every operation.
///
/// [`RefId::NULL`] is the invalid sentinel; [`Heap::free`] overwrites the
/// caller's slot with it, which is what makes double-free a guaranteed
/// no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefId(pub(crate) SlotId);

impl RefId {
    /// The invalid handle. Never resolves to a region.
    pub const NULL: RefId = RefId(SlotId::NULL);

    /// Whether this is the null sentinel. A non-null handle may still be
    /// stale; [`Heap::is_live`] is the authoritative probe.
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for RefId {
    fn default() -> Self {
        RefId::NULL
    }
}

// ── Internal node types ──────────────────────────────────────────────────────

/// One tracked allocation: payload, live-reference count, region-list links.
struct Region {
    /// Zero-initialized at creation; length is fixed for the region's life.
    payload: Box<[u8]>,
    /// Number of live reference nodes targeting this region. Zero means
    /// reclaimable: the region stays resident until the next sweep.
    live_count: usize,
    prev: Option<u32>,
    next: Option<u32>,
}

/// One live reference: target region index, reference-list links.
struct RefNode {
    region: u32,
    prev: Option<u32>,
    next: Option<u32>,
}

// ── Statistics ───────────────────────────────────────────────────────────────

/// Point-in-time snapshot of a heap's registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Live regions, including reclaimable ones not yet swept.
    pub regions: usize,
    /// Live references.
    pub refs: usize,
    /// Sum of payload sizes of all resident regions.
    pub bytes_in_use: usize,
    /// Regions with a zero live count that are still resident.
    pub reclaimable: usize,
    /// Frees remaining before the next automatic sweep.
    pub countdown: u32,
}

// ── Heap ─────────────────────────────────────────────────────────────────────

/// The registry: region arena, reference arena, both intrusive lists, the
/// sweep countdown, and cumulative counters.
///
/// Single-threaded by design; every operation is synchronous and atomic
/// with respect to the registry from the caller's point of view. Multiple
/// independent heaps may coexist.
pub struct Heap {
    regions: Slab<Region>,
    refs: Slab<RefNode>,
    region_head: Option<u32>,
    ref_head: Option<u32>,
    bytes_in_use: usize,
    countdown: u32,
    rng: XorShift64Star,

    /// Cumulative: regions ever created.
    pub total_allocations: usize,
    /// Cumulative: sweeps run (explicit and automatic).
    pub sweep_runs: usize,
    /// Cumulative: regions reclaimed by sweeps and resets.
    pub regions_reclaimed: usize,
    /// Cumulative: payload bytes reclaimed by sweeps and resets.
    pub bytes_reclaimed: usize,
}

impl Heap {
    /// Create an empty heap with a time-derived countdown seed.
    pub fn new() -> Self {
        Self::with_seed(entropy_seed())
    }

    /// Create an empty heap with a fixed countdown seed.
    ///
    /// Two heaps built from the same seed run automatic sweeps after
    /// identical free sequences, which is what the deterministic tests rely
    /// on. The countdown policy itself is tunable jitter, not a contract.
    pub fn with_seed(seed: u64) -> Self {
        let mut rng = XorShift64Star::new(seed);
        let countdown = draw_countdown(&mut rng);
        Self {
            regions: Slab::new(),
            refs: Slab::new(),
            region_head: None,
            ref_head: None,
            bytes_in_use: 0,
            countdown,
            rng,
            total_allocations: 0,
            sweep_runs: 0,
            regions_reclaimed: 0,
            bytes_reclaimed: 0,
        }
    }

    // ── Allocation / duplication / release ──────────────────────────────────

    /// Allocate a `size`-byte zero-filled region and return its first
    /// reference (the region's live count starts at 1).
    ///
    /// A zero-byte region is degenerate but legal. Returns `None` when the
    /// payload or a bookkeeping node cannot be allocated; a failed attempt
    /// leaves no partial state behind.
    pub fn alloc(&mut self, size: usize) -> Option<RefId> {
        let mut buf = Vec::new();
        if buf.try_reserve_exact(size).is_err() {
            return None;
        }
        buf.resize(size, 0u8);
        let payload = buf.into_boxed_slice();

        let region_id = self.regions.try_insert(Region {
            payload,
            live_count: 0,
            prev: None,
            next: self.region_head,
        })?;
        if let Some(old_head) = self.region_head {
            self.region_by_index_mut(old_head).prev = Some(region_id.index);
        }
        self.region_head = Some(region_id.index);
        self.bytes_in_use += size;

        match self.make_ref(region_id.index) {
            Some(r) => {
                self.total_allocations += 1;
                Some(r)
            }
            None => {
                // Reference node allocation failed: roll the region back out.
                self.reclaim_region(region_id.index);
                None
            }
        }
    }

    /// Create an additional reference to the region `r` points at,
    /// incrementing its live count.
    ///
    /// Returns `None` for a null or stale handle; a stale count is never
    /// touched.
    pub fn clone_ref(&mut self, r: RefId) -> Option<RefId> {
        let region = self.refs.get(r.0)?.region;
        self.make_ref(region)
    }

    /// Release the reference in `r`, decrementing its region's live count
    /// and overwriting the slot with [`RefId::NULL`].
    ///
    /// Always succeeds: a null or stale handle is a guaranteed no-op (so a
    /// repeated free of the same slot is harmless). A successful release
    /// also ticks the automatic-sweep countdown; when it hits zero a full
    /// [`collect`](Heap::collect) runs before this call returns and the
    /// countdown is reseeded.
    pub fn free(&mut self, r: &mut RefId) {
        let id = std::mem::replace(r, RefId::NULL);
        let (region, prev, next) = match self.refs.get(id.0) {
            Some(node) => (node.region, node.prev, node.next),
            None => return,
        };

        self.unlink_ref(id.0.index, prev, next);
        self.refs.remove(id.0);
        let slot = self.region_by_index_mut(region);
        debug_assert!(slot.live_count > 0, "live count underflow");
        slot.live_count -= 1;

        if self.countdown == 0 {
            self.collect();
            self.countdown = draw_countdown(&mut self.rng);
        } else {
            self.countdown -= 1;
        }
    }

    // ── Bounds-checked copy ─────────────────────────────────────────────────

    /// Copy `src` into the region at `offset`. Returns the number of bytes
    /// written: `src.len()` on success, 0 on any violation.
    ///
    /// The copy happens only if `offset + src.len()` does not exceed the
    /// region's size (reaching it exactly — a full-buffer write — is
    /// legal). Violations never perform a partial copy.
    pub fn write(&mut self, r: RefId, offset: usize, src: &[u8]) -> usize {
        let region = match self.refs.get(r.0) {
            Some(node) => node.region,
            None => return 0,
        };
        let payload = &mut self.region_by_index_mut(region).payload;
        let end = match offset.checked_add(src.len()) {
            Some(end) if end <= payload.len() => end,
            _ => return 0,
        };
        payload[offset..end].copy_from_slice(src);
        src.len()
    }

    /// Copy from the region at `offset` into `dst`. Returns the number of
    /// bytes read: `dst.len()` on success, 0 on any violation.
    ///
    /// Same boundary rule as [`write`](Heap::write).
    pub fn read(&self, r: RefId, offset: usize, dst: &mut [u8]) -> usize {
        let region = match self.refs.get(r.0) {
            Some(node) => node.region,
            None => return 0,
        };
        let payload = &self.region_by_index(region).payload;
        let end = match offset.checked_add(dst.len()) {
            Some(end) if end <= payload.len() => end,
            _ => return 0,
        };
        dst.copy_from_slice(&payload[offset..end]);
        dst.len()
    }

    // ── Sweep ───────────────────────────────────────────────────────────────

    /// Reclaim every region whose live count is zero.
    ///
    /// Walks the region list once, re-reading each node's successor before
    /// any unlink so reclaiming the head (or any node mid-walk) is safe.
    /// Idempotent: a second run with no intervening activity does nothing.
    /// Always safe to call, including on an empty heap.
    pub fn collect(&mut self) {
        self.sweep_runs += 1;
        let mut cur = self.region_head;
        while let Some(index) = cur {
            let (next, live_count) = {
                let region = self.region_by_index(index);
                (region.next, region.live_count)
            };
            if live_count == 0 {
                let bytes = self.reclaim_region(index);
                self.regions_reclaimed += 1;
                self.bytes_reclaimed += bytes;
            }
            cur = next;
        }
    }

    /// Drop every region and reference unconditionally, regardless of live
    /// counts, and reseed the countdown. Intended for shutdown; all
    /// outstanding handles become stale.
    pub fn reset(&mut self) {
        self.regions_reclaimed += self.regions.len();
        self.bytes_reclaimed += self.bytes_in_use;
        self.regions.clear();
        self.refs.clear();
        self.region_head = None;
        self.ref_head = None;
        self.bytes_in_use = 0;
        self.countdown = draw_countdown(&mut self.rng);
    }

    // ── Diagnostics & accessors ─────────────────────────────────────────────

    /// Snapshot the registry counters. Read-only.
    pub fn stats(&self) -> HeapStats {
        let mut reclaimable = 0;
        let mut cur = self.region_head;
        while let Some(index) = cur {
            let region = self.region_by_index(index);
            if region.live_count == 0 {
                reclaimable += 1;
            }
            cur = region.next;
        }
        HeapStats {
            regions: self.regions.len(),
            refs: self.refs.len(),
            bytes_in_use: self.bytes_in_use,
            reclaimable,
            countdown: self.countdown,
        }
    }

    /// Write a one-line stats report to `out`. Read-only.
    pub fn dump_stats<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let s = self.stats();
        writeln!(
            out,
            "[heap] regions={}, refs={}, bytes_in_use={}, reclaimable={}, countdown={}",
            s.regions, s.refs, s.bytes_in_use, s.reclaimable, s.countdown
        )
    }

    /// Payload size of the region `r` points at, or `None` for a null or
    /// stale handle.
    pub fn size_of(&self, r: RefId) -> Option<usize> {
        let region = self.refs.get(r.0)?.region;
        Some(self.region_by_index(region).payload.len())
    }

    /// Whether `r` currently resolves to a live reference.
    pub fn is_live(&self, r: RefId) -> bool {
        self.refs.get(r.0).is_some()
    }

    /// Raw address of the region's payload, with no effect on any count.
    ///
    /// This is the interop escape hatch and it bypasses every guarantee the
    /// registry otherwise provides. Returns `None` for a null or stale
    /// handle; for a zero-byte region the pointer is dangling-but-aligned
    /// and must not be dereferenced.
    ///
    /// # Safety
    ///
    /// The returned address is valid only while the originating reference
    /// (or a sibling reference to the same region) stays live and the
    /// region unswept. The registry provides no protection past that point:
    /// using the address after the region is reclaimed, whether by
    /// [`free`](Heap::free)-then-[`collect`](Heap::collect), by
    /// [`reset`](Heap::reset), or by dropping the heap, is undefined
    /// behavior. Writes through the pointer must also stay within the
    /// region's size.
    pub unsafe fn raw_ptr(&self, r: RefId) -> Option<NonNull<u8>> {
        let region = self.refs.get(r.0)?.region;
        let payload = &self.region_by_index(region).payload;
        NonNull::new(payload.as_ptr() as *mut u8)
    }

    // ── List surgery (internal) ─────────────────────────────────────────────

    /// Register a new reference node at the head of the reference list and
    /// raise the target region's live count.
    fn make_ref(&mut self, region: u32) -> Option<RefId> {
        let id = self.refs.try_insert(RefNode {
            region,
            prev: None,
            next: self.ref_head,
        })?;
        if let Some(old_head) = self.ref_head {
            self.ref_by_index_mut(old_head).prev = Some(id.index);
        }
        self.ref_head = Some(id.index);
        self.region_by_index_mut(region).live_count += 1;
        Some(RefId(id))
    }

    /// Detach region `index` from the region list and free its slot.
    /// Returns the payload size. Does not touch cumulative counters.
    fn reclaim_region(&mut self, index: u32) -> usize {
        let (prev, next) = {
            let region = self.region_by_index(index);
            (region.prev, region.next)
        };
        self.unlink_region(index, prev, next);
        let region = self
            .regions
            .remove_at(index)
            .expect("region list corrupted: node vanished during unlink");
        let bytes = region.payload.len();
        self.bytes_in_use -= bytes;
        bytes
    }

    /// Unlink node `index` from the region list, checking that its siblings
    /// actually point back at it. A mismatch means the registry's data
    /// model is broken and there is no safe way to continue.
    fn unlink_region(&mut self, index: u32, prev: Option<u32>, next: Option<u32>) {
        match prev {
            Some(p) => {
                let prev_node = self.region_by_index_mut(p);
                if prev_node.next != Some(index) {
                    panic!("region list corrupted: predecessor does not link back");
                }
                prev_node.next = next;
            }
            None => {
                if self.region_head != Some(index) {
                    panic!("region list corrupted: headless node has no predecessor");
                }
                self.region_head = next;
            }
        }
        if let Some(n) = next {
            let next_node = self.region_by_index_mut(n);
            if next_node.prev != Some(index) {
                panic!("region list corrupted: successor does not link back");
            }
            next_node.prev = prev;
        }
    }

    /// Reference-list counterpart of [`unlink_region`](Heap::unlink_region).
    fn unlink_ref(&mut self, index: u32, prev: Option<u32>, next: Option<u32>) {
        match prev {
            Some(p) => {
                let prev_node = self.ref_by_index_mut(p);
                if prev_node.next != Some(index) {
                    panic!("reference list corrupted: predecessor does not link back");
                }
                prev_node.next = next;
            }
            None => {
                if self.ref_head != Some(index) {
                    panic!("reference list corrupted: headless node has no predecessor");
                }
                self.ref_head = next;
            }
        }
        if let Some(n) = next {
            let next_node = self.ref_by_index_mut(n);
            if next_node.prev != Some(index) {
                panic!("reference list corrupted: successor does not link back");
            }
            next_node.prev = prev;
        }
    }

    fn region_by_index(&self, index: u32) -> &Region {
        self.regions
            .by_index(index)
            .expect("region list corrupted: dangling index")
    }

    fn region_by_index_mut(&mut self, index: u32) -> &mut Region {
        self.regions
            .by_index_mut(index)
            .expect("region list corrupted: dangling index")
    }

    fn ref_by_index_mut(&mut self, index: u32) -> &mut RefNode {
        self.refs
            .by_index_mut(index)
            .expect("reference list corrupted: dangling index")
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw the next automatic-sweep countdown.
fn draw_countdown(rng: &mut XorShift64Star) -> u32 {
    let span = (SWEEP_COUNTDOWN_MAX - SWEEP_COUNTDOWN_MIN + 1) as u64;
    SWEEP_COUNTDOWN_MIN + rng.below(span) as u32
}

/// Best-effort nondeterministic seed for `Heap::new`.
fn entropy_seed() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as u64 | 1,
        Err(_) => 0x5DEE_CE66_D1CE_4E5D,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Allocation, duplication, release
    // =========================================================================

    #[test]
    fn test_alloc_creates_region_and_first_ref() {
        let mut heap = Heap::with_seed(1);
        let r = heap.alloc(32).unwrap();
        assert!(heap.is_live(r));
        assert!(!r.is_null());

        let s = heap.stats();
        assert_eq!(s.regions, 1);
        assert_eq!(s.refs, 1);
        assert_eq!(s.bytes_in_use, 32);
        assert_eq!(s.reclaimable, 0);
        assert_eq!(heap.total_allocations, 1);
    }

    #[test]
    fn test_alloc_zero_size_is_legal() {
        let mut heap = Heap::with_seed(1);
        let r = heap.alloc(0).unwrap();
        assert!(heap.is_live(r));
        assert_eq!(heap.size_of(r), Some(0));
        assert_eq!(heap.stats().bytes_in_use, 0);
        // Any non-empty copy against it is out of bounds.
        assert_eq!(heap.write(r, 0, b"x"), 0);
        assert_eq!(heap.write(r, 0, b""), 0);
        assert_eq!(heap.read(r, 0, &mut []), 0);
    }

    #[test]
    fn test_clone_ref_raises_count() {
        let mut heap = Heap::with_seed(1);
        let r1 = heap.alloc(8).unwrap();
        let r2 = heap.clone_ref(r1).unwrap();
        assert_ne!(r1, r2);
        assert_eq!(heap.stats().refs, 2);
        assert_eq!(heap.stats().regions, 1);
        assert!(heap.is_live(r2));
    }

    #[test]
    fn test_clone_ref_of_null_fails() {
        let mut heap = Heap::with_seed(1);
        assert_eq!(heap.clone_ref(RefId::NULL), None);
    }

    #[test]
    fn test_clone_ref_of_stale_handle_fails() {
        let mut heap = Heap::with_seed(1);
        let mut r = heap.alloc(8).unwrap();
        let stale = r;
        heap.free(&mut r);
        // The stale copy must not resurrect the region or touch its count.
        assert_eq!(heap.clone_ref(stale), None);
        assert_eq!(heap.stats().refs, 0);
    }

    #[test]
    fn test_free_nulls_the_slot() {
        let mut heap = Heap::with_seed(1);
        let mut r = heap.alloc(8).unwrap();
        heap.free(&mut r);
        assert_eq!(r, RefId::NULL);
        assert_eq!(heap.stats().refs, 0);
        assert_eq!(heap.stats().reclaimable, 1);
    }

    #[test]
    fn test_double_free_is_a_noop() {
        let mut heap = Heap::with_seed(1);
        let mut r = heap.alloc(8).unwrap();
        heap.free(&mut r);
        let before = heap.stats();
        heap.free(&mut r);
        heap.free(&mut r);
        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn test_free_of_stale_copy_is_a_noop() {
        let mut heap = Heap::with_seed(1);
        let mut r = heap.alloc(8).unwrap();
        let mut stale = r;
        heap.free(&mut r);
        let before = heap.stats();
        heap.free(&mut stale);
        assert_eq!(stale, RefId::NULL);
        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn test_refcount_conservation() {
        // After any clone/free sequence, the live count equals the number
        // of unreleased handles.
        let mut heap = Heap::with_seed(99);
        let mut handles = vec![heap.alloc(16).unwrap()];
        for _ in 0..5 {
            let dup = heap.clone_ref(handles[0]).unwrap();
            handles.push(dup);
        }
        assert_eq!(heap.stats().refs, 6);

        let mut h = handles.swap_remove(2);
        heap.free(&mut h);
        let mut h = handles.swap_remove(0);
        heap.free(&mut h);
        assert_eq!(heap.stats().refs, handles.len());
        assert_eq!(heap.stats().regions, 1);

        for mut h in handles {
            heap.free(&mut h);
        }
        heap.collect();
        assert_eq!(heap.stats().refs, 0);
        assert_eq!(heap.stats().regions, 0);
    }

    // =========================================================================
    // Bounds-checked copy
    // =========================================================================

    #[test]
    fn test_write_read_round_trip() {
        let mut heap = Heap::with_seed(1);
        let r = heap.alloc(64).unwrap();
        assert_eq!(heap.write(r, 10, b"payload"), 7);
        let mut buf = [0u8; 7];
        assert_eq!(heap.read(r, 10, &mut buf), 7);
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn test_fresh_region_reads_as_zeros() {
        let mut heap = Heap::with_seed(1);
        let r = heap.alloc(16).unwrap();
        let mut buf = [0xAAu8; 16];
        assert_eq!(heap.read(r, 0, &mut buf), 16);
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn test_copy_at_exact_boundary_succeeds() {
        let mut heap = Heap::with_seed(1);
        let r = heap.alloc(16).unwrap();
        // offset + n == size is a full-buffer access and must succeed.
        assert_eq!(heap.write(r, 0, &[7u8; 16]), 16);
        assert_eq!(heap.write(r, 12, &[9u8; 4]), 4);
        let mut buf = [0u8; 16];
        assert_eq!(heap.read(r, 0, &mut buf), 16);
        assert_eq!(&buf[..12], &[7u8; 12]);
        assert_eq!(&buf[12..], &[9u8; 4]);
    }

    #[test]
    fn test_copy_one_past_boundary_fails() {
        let mut heap = Heap::with_seed(1);
        let r = heap.alloc(16).unwrap();
        heap.write(r, 0, &[7u8; 16]);

        assert_eq!(heap.write(r, 1, &[0u8; 16]), 0);
        assert_eq!(heap.write(r, 16, &[0u8; 1]), 0);
        let mut buf = [0u8; 17];
        assert_eq!(heap.read(r, 0, &mut buf), 0);

        // Failed writes must not have partially clobbered the payload.
        let mut check = [0u8; 16];
        assert_eq!(heap.read(r, 0, &mut check), 16);
        assert_eq!(check, [7u8; 16]);
    }

    #[test]
    fn test_copy_offset_overflow_fails() {
        let mut heap = Heap::with_seed(1);
        let r = heap.alloc(16).unwrap();
        assert_eq!(heap.write(r, usize::MAX, b"xy"), 0);
        let mut buf = [0u8; 2];
        assert_eq!(heap.read(r, usize::MAX - 1, &mut buf), 0);
    }

    #[test]
    fn test_copy_through_invalid_handle_fails() {
        let mut heap = Heap::with_seed(1);
        let mut buf = [0u8; 4];
        assert_eq!(heap.write(RefId::NULL, 0, b"data"), 0);
        assert_eq!(heap.read(RefId::NULL, 0, &mut buf), 0);

        let mut r = heap.alloc(8).unwrap();
        let stale = r;
        heap.free(&mut r);
        assert_eq!(heap.write(stale, 0, b"data"), 0);
        assert_eq!(heap.read(stale, 0, &mut buf), 0);
    }

    // =========================================================================
    // Sweep and reclamation
    // =========================================================================

    #[test]
    fn test_region_survives_free_until_collect() {
        // The countdown reseeds to at least 1, so a single free never
        // triggers the automatic sweep.
        let mut heap = Heap::with_seed(3);
        let mut r = heap.alloc(24).unwrap();
        heap.free(&mut r);

        let s = heap.stats();
        assert_eq!(s.regions, 1);
        assert_eq!(s.reclaimable, 1);
        assert_eq!(s.bytes_in_use, 24);

        heap.collect();
        let s = heap.stats();
        assert_eq!(s.regions, 0);
        assert_eq!(s.bytes_in_use, 0);
        assert_eq!(heap.regions_reclaimed, 1);
        assert_eq!(heap.bytes_reclaimed, 24);
    }

    #[test]
    fn test_collect_keeps_referenced_regions() {
        let mut heap = Heap::with_seed(1);
        let keep = heap.alloc(8).unwrap();
        let mut drop_me = heap.alloc(8).unwrap();
        heap.free(&mut drop_me);
        heap.collect();

        let s = heap.stats();
        assert_eq!(s.regions, 1);
        assert_eq!(s.refs, 1);
        assert!(heap.is_live(keep));
    }

    #[test]
    fn test_collect_is_idempotent() {
        let mut heap = Heap::with_seed(1);
        let _keep = heap.alloc(8).unwrap();
        let mut a = heap.alloc(8).unwrap();
        let mut b = heap.alloc(8).unwrap();
        heap.free(&mut a);
        heap.free(&mut b);

        heap.collect();
        let after_first = (heap.stats(), heap.regions_reclaimed, heap.bytes_reclaimed);
        heap.collect();
        // Only the run counter moves on the second pass.
        assert_eq!(heap.stats(), after_first.0);
        assert_eq!(heap.regions_reclaimed, after_first.1);
        assert_eq!(heap.bytes_reclaimed, after_first.2);
    }

    #[test]
    fn test_collect_on_empty_heap() {
        let mut heap = Heap::with_seed(1);
        let before = heap.stats();
        heap.collect();
        assert_eq!(heap.stats(), before);
        assert_eq!(heap.sweep_runs, 1);
    }

    #[test]
    fn test_collect_reclaims_head_and_interior() {
        // Head, interior, and tail of the region list all reclaim cleanly.
        let mut heap = Heap::with_seed(1);
        let mut ids: Vec<RefId> = (0..5).map(|_| heap.alloc(4).unwrap()).collect();
        // Free the newest (list head), one interior, and the oldest (tail).
        heap.free(&mut ids[4]);
        heap.free(&mut ids[2]);
        heap.free(&mut ids[0]);
        heap.collect();

        let s = heap.stats();
        assert_eq!(s.regions, 2);
        assert_eq!(s.bytes_in_use, 8);
        assert!(heap.is_live(ids[1]));
        assert!(heap.is_live(ids[3]));
    }

    #[test]
    fn test_auto_sweep_converges() {
        // Churn without ever calling collect(): the countdown must keep the
        // reclaimable backlog bounded by its own maximum interval.
        let mut heap = Heap::with_seed(42);
        for _ in 0..200 {
            let mut r = heap.alloc(8).unwrap();
            heap.free(&mut r);
        }
        assert!(heap.sweep_runs > 0);
        assert!(heap.stats().reclaimable <= SWEEP_COUNTDOWN_MAX as usize + 1);
    }

    #[test]
    fn test_auto_sweep_is_deterministic_under_fixed_seed() {
        let run = |seed: u64| {
            let mut heap = Heap::with_seed(seed);
            for _ in 0..50 {
                let mut r = heap.alloc(8).unwrap();
                heap.free(&mut r);
            }
            (heap.sweep_runs, heap.regions_reclaimed, heap.stats())
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_reset_drops_everything() {
        let mut heap = Heap::with_seed(1);
        let live = heap.alloc(32).unwrap();
        let mut dead = heap.alloc(16).unwrap();
        heap.free(&mut dead);

        heap.reset();
        let s = heap.stats();
        assert_eq!(s.regions, 0);
        assert_eq!(s.refs, 0);
        assert_eq!(s.bytes_in_use, 0);
        // Even the still-referenced handle is now stale.
        assert!(!heap.is_live(live));
        assert_eq!(heap.regions_reclaimed, 2);
        assert_eq!(heap.bytes_reclaimed, 48);
    }

    // =========================================================================
    // Handle staleness and slot reuse
    // =========================================================================

    #[test]
    fn test_reused_slot_does_not_resurrect_stale_handle() {
        let mut heap = Heap::with_seed(1);
        let mut r = heap.alloc(8).unwrap();
        let stale = r;
        heap.free(&mut r);
        heap.collect();

        // New allocations will reuse the freed slots.
        let fresh = heap.alloc(8).unwrap();
        assert!(heap.is_live(fresh));
        assert!(!heap.is_live(stale));
        assert_eq!(heap.size_of(stale), None);
        assert_eq!(heap.write(stale, 0, b"x"), 0);
    }

    #[test]
    fn test_reset_does_not_resurrect_stale_handle() {
        let mut heap = Heap::with_seed(1);
        let old = heap.alloc(32).unwrap();
        heap.reset();

        // The new region reuses the old slot; the pre-reset handle must
        // stay stale and must not be able to touch the new region.
        let fresh = heap.alloc(8).unwrap();
        assert!(heap.is_live(fresh));
        assert!(!heap.is_live(old));
        assert_eq!(heap.clone_ref(old), None);
        assert_eq!(heap.write(old, 0, b"x"), 0);
        assert_eq!(heap.size_of(old), None);

        let mut stale = old;
        heap.free(&mut stale);
        assert_eq!(heap.stats().refs, 1);
        assert_eq!(heap.stats().reclaimable, 0);
    }

    #[test]
    fn test_heaps_are_independent() {
        let mut a = Heap::with_seed(1);
        let mut b = Heap::with_seed(1);
        let mut ra = a.alloc(8).unwrap();
        // The empty heap has no slot this handle could resolve to.
        assert!(b.clone_ref(ra).is_none());
        assert_eq!(b.stats().regions, 0);
        let _rb = b.alloc(4).unwrap();
        assert_eq!(a.stats().bytes_in_use, 8);
        assert_eq!(b.stats().bytes_in_use, 4);
        a.free(&mut ra);
        assert_eq!(b.stats().refs, 1);
    }

    // =========================================================================
    // Diagnostics and raw access
    // =========================================================================

    #[test]
    fn test_dump_stats_format() {
        let mut heap = Heap::with_seed(1);
        let _r = heap.alloc(16).unwrap();
        let mut out = Vec::new();
        heap.dump_stats(&mut out).unwrap();
        let line = String::from_utf8(out).unwrap();
        let s = heap.stats();
        assert_eq!(
            line,
            format!(
                "[heap] regions=1, refs=1, bytes_in_use=16, reclaimable=0, countdown={}\n",
                s.countdown
            )
        );
    }

    #[test]
    fn test_size_of_and_is_live() {
        let mut heap = Heap::with_seed(1);
        let mut r = heap.alloc(100).unwrap();
        assert_eq!(heap.size_of(r), Some(100));
        assert!(heap.is_live(r));
        heap.free(&mut r);
        assert_eq!(heap.size_of(r), None);
        assert!(!heap.is_live(r));
        assert_eq!(heap.size_of(RefId::NULL), None);
    }

    #[test]
    fn test_raw_ptr_sees_written_bytes() {
        let mut heap = Heap::with_seed(1);
        let r = heap.alloc(4).unwrap();
        heap.write(r, 0, &[1, 2, 3, 4]);
        // SAFETY: `r` stays live for the whole read.
        unsafe {
            let ptr = heap.raw_ptr(r).unwrap();
            assert_eq!(*ptr.as_ptr(), 1);
            assert_eq!(*ptr.as_ptr().add(3), 4);
        }
    }

    #[test]
    fn test_raw_ptr_of_invalid_handle_is_none() {
        let mut heap = Heap::with_seed(1);
        let mut r = heap.alloc(4).unwrap();
        let stale = r;
        heap.free(&mut r);
        // SAFETY: no dereference happens.
        unsafe {
            assert!(heap.raw_ptr(RefId::NULL).is_none());
            assert!(heap.raw_ptr(stale).is_none());
        }
    }

    #[test]
    fn test_countdown_is_always_in_policy_range() {
        let mut rng = XorShift64Star::new(555);
        for _ in 0..1000 {
            let c = draw_countdown(&mut rng);
            assert!((SWEEP_COUNTDOWN_MIN..=SWEEP_COUNTDOWN_MAX).contains(&c));
        }
    }
}
