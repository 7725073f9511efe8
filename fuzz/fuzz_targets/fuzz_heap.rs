#![no_main]
//! Fuzz target for the heap's public API.
//!
//! Interprets arbitrary bytes as an operation sequence — alloc, clone,
//! free, write, read, collect, stats — against one heap, deliberately
//! including null and stale handles and out-of-bounds offsets. Caller
//! mistakes must come back as sentinel returns; a panic is reserved for
//! internal list corruption, so any panic here is a bug.
//!
//! Run: cargo +nightly fuzz run fuzz_heap

use libfuzzer_sys::fuzz_target;

use lazygc::{Heap, RefId};

const MAX_HANDLES: usize = 64;
const MAX_REGION: usize = 4096;

fuzz_target!(|data: &[u8]| {
    let mut heap = Heap::with_seed(0xF00D);
    // Freed slots are kept around on purpose: later ops replay them as
    // stale handles.
    let mut handles: Vec<RefId> = Vec::new();

    let mut bytes = data.iter().copied();
    let mut scratch = [0u8; 256];

    while let Some(op) = bytes.next() {
        let mut arg = || bytes.next().unwrap_or(0) as usize;
        let pick = |handles: &Vec<RefId>, i: usize| {
            handles.get(i % handles.len().max(1)).copied().unwrap_or(RefId::NULL)
        };

        match op % 8 {
            0 => {
                if handles.len() < MAX_HANDLES {
                    let size = arg() * 17 % MAX_REGION;
                    if let Some(r) = heap.alloc(size) {
                        handles.push(r);
                    }
                }
            }
            1 => {
                let r = pick(&handles, arg());
                if handles.len() < MAX_HANDLES {
                    if let Some(dup) = heap.clone_ref(r) {
                        handles.push(dup);
                    }
                }
            }
            2 => {
                let i = arg();
                if !handles.is_empty() {
                    let i = i % handles.len();
                    let mut r = handles[i];
                    heap.free(&mut r);
                    // Keep the (now stale) original id in place half the
                    // time to exercise double-free paths.
                    if i % 2 == 0 {
                        handles[i] = RefId::NULL;
                    }
                }
            }
            3 => {
                let r = pick(&handles, arg());
                let offset = arg() * arg();
                let len = arg() % scratch.len();
                let _ = heap.write(r, offset, &scratch[..len]);
            }
            4 => {
                let r = pick(&handles, arg());
                let offset = arg() * arg();
                let len = arg() % scratch.len();
                let _ = heap.read(r, offset, &mut scratch[..len]);
            }
            5 => heap.collect(),
            6 => {
                let r = pick(&handles, arg());
                let _ = heap.size_of(r);
                let _ = heap.is_live(r);
                let _ = heap.dump_stats(&mut std::io::sink());
            }
            _ => {
                if arg() == 255 {
                    heap.reset();
                }
            }
        }
    }

    // Final accounting must balance no matter what sequence ran.
    let stats = heap.stats();
    assert!(stats.reclaimable <= stats.regions);
    assert_eq!(
        heap.total_allocations,
        heap.regions_reclaimed + stats.regions
    );
});
