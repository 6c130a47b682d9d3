use kernel_info::boot::BootMemory;
use kernel_info::memory_map::{MemoryMap, MemoryRegion, RegionKind};
use kernel_memory_addresses::{PhysicalAddress, Size4K};
use kernel_pmm::{BLOCK_SIZE, BLOCKS_PER_LARGE_BLOCK, FrameAllocError, Halt, LockedFrameAllocator};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;

const WORDS: usize = 64;

/// Halt hook that records the call and hands control back.
#[derive(Default)]
struct RecordingHalt {
    calls: AtomicUsize,
    last: Mutex<Option<FrameAllocError>>,
}

impl Halt for RecordingHalt {
    fn halt(&self, reason: &FrameAllocError) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(*reason);
    }
}

type Pmm = LockedFrameAllocator<RecordingHalt, WORDS>;

fn usable(base: u64, length: u64) -> MemoryRegion {
    MemoryRegion::new(PhysicalAddress::new(base), length, RegionKind::Usable)
}

fn init(regions: &[MemoryRegion], kernel_end: u64) -> Pmm {
    let bytes: Vec<u8> = regions.iter().flat_map(MemoryRegion::to_record).collect();
    let boot = BootMemory::new(0, 8 * 1024, MemoryMap::new(&bytes));
    let pmm = Pmm::new(RecordingHalt::default());
    pmm.initialize(&boot, PhysicalAddress::new(kernel_end)).unwrap();
    pmm
}

#[test]
fn exhaustion_runs_halt_hook() {
    // Everything used except the sentinel block 0.
    let pmm = init(&[usable(0, 0x1000)], 0);
    let before = pmm.stats();

    assert_eq!(pmm.allocate_block(), Err(FrameAllocError::OutOfMemory));
    assert_eq!(pmm.halt_hook().calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *pmm.halt_hook().last.lock().unwrap(),
        Some(FrameAllocError::OutOfMemory)
    );
    assert_eq!(pmm.stats(), before);

    // The lock was released before halting.
    assert_eq!(pmm.allocate_block(), Err(FrameAllocError::OutOfMemory));
    assert_eq!(pmm.halt_hook().calls.load(Ordering::SeqCst), 2);
}

#[test]
fn successful_allocation_does_not_halt() {
    let pmm = init(&[usable(0x10_0000, 0x1_0000)], 0x10_0000);
    for i in 0..16 {
        assert_eq!(pmm.allocate_block().unwrap().as_u64(), 0x10_0000 + i * BLOCK_SIZE);
    }
    assert_eq!(pmm.halt_hook().calls.load(Ordering::SeqCst), 0);

    assert!(pmm.allocate_block().is_err());
    assert_eq!(pmm.halt_hook().calls.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_large_run_is_not_fatal() {
    let pmm = init(&[usable(0x10_0000, 0x1_0000)], 0x10_0000);
    assert_eq!(
        pmm.allocate_large_block(),
        Err(FrameAllocError::NoContiguousRun {
            blocks: BLOCKS_PER_LARGE_BLOCK
        })
    );
    assert_eq!(pmm.halt_hook().calls.load(Ordering::SeqCst), 0);
}

#[test]
fn initialization_happens_once() {
    let bytes = usable(0x10_0000, 0x1_0000).to_record();
    let boot = BootMemory::new(0, 8 * 1024, MemoryMap::new(&bytes));
    let pmm = Pmm::new(RecordingHalt::default());
    assert!(!pmm.is_initialized());

    let stats = pmm
        .initialize(&boot, PhysicalAddress::new(0x10_0000))
        .unwrap();
    assert_eq!(stats.free_blocks(), 16);
    assert!(pmm.is_initialized());

    let frame = pmm.allocate_block().unwrap();
    assert_eq!(
        pmm.initialize(&boot, PhysicalAddress::new(0x10_0000)),
        Err(FrameAllocError::AlreadyInitialized)
    );
    assert!(pmm.is_block_used(frame), "re-initialization must not reset state");
}

#[test]
fn early_reservations_go_through_the_lock() {
    let pmm = init(&[usable(0x10_0000, 0x10_0000)], 0x10_0000);
    let free = pmm.stats().free_blocks();

    assert_eq!(pmm.mark_region_used(PhysicalAddress::new(0x10_0000), 0x4000), 4);
    assert_eq!(pmm.stats().free_blocks(), free - 4);
    assert_eq!(pmm.allocate_block().unwrap().as_u64(), 0x10_4000);

    assert_eq!(pmm.mark_region_free(PhysicalAddress::new(0x10_0000), 0x4000), 4);
    assert_eq!(pmm.allocate_block().unwrap().as_u64(), 0x10_0000);
    assert!(pmm.is_consistent());
}

#[test]
fn concurrent_allocations_are_unique() {
    let threads = 8;
    let per_thread = 64;
    let pmm = init(&[usable(0x10_0000, 0x40_0000)], 0x10_0000);
    let baseline = pmm.stats();
    let start = Barrier::new(threads);

    let held: Vec<PhysicalAddress> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    start.wait();
                    let mut mine = Vec::new();
                    for round in 0..per_thread {
                        mine.push(pmm.allocate_block().unwrap());
                        if round % 3 == 0 {
                            let frame = mine.swap_remove(0);
                            unsafe { pmm.free_block(frame) };
                        }
                    }
                    mine
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let unique: HashSet<_> = held.iter().copied().collect();
    assert_eq!(unique.len(), held.len(), "a block was handed out twice");
    assert!(held.iter().all(|pa| pa.as_u64() != 0));
    assert_eq!(pmm.stats().used_blocks, baseline.used_blocks + held.len());
    assert!(pmm.is_consistent());
    assert_eq!(pmm.halt_hook().calls.load(Ordering::SeqCst), 0);

    for frame in held {
        unsafe { pmm.free_block(frame) };
    }
    assert_eq!(pmm.stats(), baseline);
}

#[test]
fn concurrent_large_and_single_allocations_do_not_overlap() {
    let threads = 4;
    let pmm = init(&[usable(0x10_0000, 0x70_0000)], 0x10_0000);
    let baseline = pmm.stats();
    let start = Barrier::new(threads);

    // (first block, block count)
    let held: Vec<(usize, usize)> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    start.wait();
                    let mut mine = Vec::new();
                    for round in 0..10 {
                        if round < 2 {
                            if let Ok(pa) = pmm.allocate_large_block() {
                                mine.push((pa.block_index::<Size4K>(), BLOCKS_PER_LARGE_BLOCK));
                            }
                        }
                        for _ in 0..4 {
                            let pa = pmm.allocate_block().unwrap();
                            mine.push((pa.block_index::<Size4K>(), 1));
                        }
                    }
                    mine
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let mut ranges = held.clone();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        let (a_start, a_len) = pair[0];
        let (b_start, _) = pair[1];
        assert!(a_start + a_len <= b_start, "overlap at block {b_start:#x}");
    }

    let used: usize = held.iter().map(|&(_, len)| len).sum();
    assert_eq!(pmm.stats().used_blocks, baseline.used_blocks + used);
    assert!(pmm.is_consistent());

    for (first, len) in held {
        let pa = PhysicalAddress::from_block_index::<Size4K>(first);
        if len == 1 {
            unsafe { pmm.free_block(pa) };
        } else {
            unsafe { pmm.free_large_block(pa) };
        }
    }
    assert_eq!(pmm.stats(), baseline);
}
