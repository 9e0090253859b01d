//! Property tests: `used() + available() == size()` after every operation,
//! for every arena, plus the stack LIFO law.

use pami_region::{FreeListArena, PoolArena, Region, RegionError, RegionPtr, StackArena};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Alloc(usize),
    /// Free the live allocation at this index (modulo the live count).
    Free(usize),
    /// Free an arbitrary offset, usually invalid.
    FreeRaw(usize),
    FreeAll,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            6 => (0usize..160).prop_map(Op::Alloc),
            4 => any::<usize>().prop_map(Op::Free),
            1 => (0usize..600).prop_map(Op::FreeRaw),
            1 => Just(Op::FreeAll),
        ],
        1..120,
    )
}

fn assert_conserved<R: Region>(arena: &R) -> Result<(), TestCaseError> {
    prop_assert_eq!(arena.used() + arena.available(), arena.size());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pool_conserves_bytes(chunk_size in 8usize..64, ops in ops()) {
        let mut buf = vec![0u8; 512];
        let mut pool = PoolArena::create(&mut buf, chunk_size).unwrap();
        let mut live: Vec<RegionPtr> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(_) => {
                    let before = pool.available();
                    match pool.alloc() {
                        Some(ptr) => {
                            prop_assert_eq!(pool.available(), before - chunk_size);
                            live.push(ptr);
                        }
                        None => prop_assert_eq!(before, 0),
                    }
                }
                Op::Free(index) if !live.is_empty() => {
                    let ptr = live.swap_remove(index % live.len());
                    pool.free(ptr).unwrap();
                }
                Op::Free(_) => {}
                Op::FreeRaw(offset) => {
                    let ptr = RegionPtr::from_offset(offset);
                    // Only reject: never free something that might be live or already free.
                    if offset < pool.begin() || offset >= pool.end() {
                        prop_assert_eq!(pool.free(ptr), Err(RegionError::OutOfBounds));
                    } else if (offset - pool.begin()) % chunk_size != 0 {
                        prop_assert_eq!(pool.free(ptr), Err(RegionError::Misaligned));
                    }
                }
                Op::FreeAll => {
                    pool.free_all();
                    live.clear();
                }
            }
            assert_conserved(&pool)?;
            prop_assert_eq!(pool.used(), live.len() * chunk_size);
        }
    }

    #[test]
    fn freelist_conserves_bytes_and_coalesces(ops in ops()) {
        let mut buf = vec![0u8; 1024];
        let mut heap = FreeListArena::create(&mut buf).unwrap();
        let mut live: Vec<RegionPtr> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(size) => {
                    if let Some(ptr) = heap.alloc(size) {
                        let granted = heap.object_size(ptr).unwrap();
                        prop_assert!(granted >= FreeListArena::padded_size(size).unwrap());
                        live.push(ptr);
                    }
                }
                Op::Free(index) if !live.is_empty() => {
                    let ptr = live.swap_remove(index % live.len());
                    heap.free(ptr).unwrap();
                }
                Op::Free(_) => {}
                Op::FreeRaw(offset) => {
                    if offset < heap.begin() || offset >= heap.end() {
                        prop_assert_eq!(
                            heap.free(RegionPtr::from_offset(offset)),
                            Err(RegionError::OutOfBounds)
                        );
                    }
                }
                Op::FreeAll => {
                    heap.free_all();
                    live.clear();
                }
            }
            assert_conserved(&heap)?;

            let blocks: Vec<_> = heap.free_blocks().collect();
            for pair in blocks.windows(2) {
                prop_assert!(pair[0].offset + pair[0].size < pair[1].offset);
            }
        }

        for ptr in live {
            heap.free(ptr).unwrap();
        }
        prop_assert!(heap.is_empty());
        prop_assert_eq!(heap.free_block_count(), 1);
    }

    #[test]
    fn stack_lifo_law(chunk_size in 1usize..48, n in 0usize..20) {
        let mut buf = vec![0u8; StackArena::HEADER_SIZE + 20 * 48];
        let mut stack = StackArena::create(&mut buf, chunk_size).unwrap();

        for _ in 0..n {
            stack.alloc();
            assert_conserved(&stack)?;
        }
        prop_assert_eq!(stack.used(), n * chunk_size);
        for _ in 0..n {
            stack.free().unwrap();
            assert_conserved(&stack)?;
        }
        prop_assert_eq!(stack.used(), 0);
        prop_assert_eq!(stack.free(), Err(RegionError::StackEmpty));
    }
}
