//! # Free-List Arena
//!
//! Variable-size allocator for value cells whose lifetimes are independent of
//! each other.
//!
//! ## Block Layout
//!
//! ```text
//!  free block:       │ size │ next │ ...unused...          │
//!  allocated block:  │ size │ payload (returned pointer) ─▶ │
//! ```
//!
//! Free blocks are kept in strictly increasing address order, and two free
//! blocks never touch: whenever a free makes two of them adjacent they are
//! merged on the spot.
//!
//! ## Request Padding
//!
//! A request of `n` bytes occupies `max(round_up(n + WORD, WORD), NODE_SIZE)`
//! bytes, so every allocated block can later host a free node.

use bytemuck::{Pod, Zeroable};

use crate::error::{RegionError, RegionResult};
use crate::region::{
    align_up, distance, read_pod, write_pod, write_word, Region, RegionPtr, NIL, WORD,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct FreeListHeader {
    head: usize,
    begin: usize,
    end: usize,
    size: usize,
}

/// Overlay on the first bytes of every free block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct FreeNode {
    size: usize,
    next: usize,
}

/// A free block as seen from outside the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeBlock {
    /// Offset of the block (its node, not a payload pointer).
    pub offset: usize,
    /// Size of the block in bytes, node included.
    pub size: usize,
}

/// A general-purpose allocator over a caller-supplied buffer, with block
/// splitting and coalescing.
///
/// # Thread Safety
///
/// Not synchronized. Use one arena per thread or wrap it in
/// [`Locked`](crate::sync::Locked).
///
/// # Example
///
/// ```rust
/// use pami_region::{FreeListArena, Region};
///
/// let mut buffer = [0u8; 512];
/// let mut heap = FreeListArena::create(&mut buffer)?;
///
/// let a = heap.alloc(24).expect("room for a");
/// let b = heap.alloc(100).expect("room for b");
/// heap.free(a)?;
/// heap.free(b)?;
///
/// // Both blocks merged back into one.
/// assert_eq!(heap.free_block_count(), 1);
/// assert!(heap.is_empty());
/// # Ok::<(), pami_region::RegionError>(())
/// ```
#[derive(Debug)]
pub struct FreeListArena<'a> {
    buf: &'a mut [u8],
}

impl<'a> FreeListArena<'a> {
    /// Bytes reserved at the start of the buffer for the arena header.
    pub const HEADER_SIZE: usize = std::mem::size_of::<FreeListHeader>();

    /// Size of a free node: the smallest block the arena ever creates.
    pub const NODE_SIZE: usize = std::mem::size_of::<FreeNode>();

    /// Bytes stored before every returned pointer.
    pub const OBJECT_HEADER_SIZE: usize = WORD;

    /// Checks whether a buffer of `buffer_size` bytes can host the arena.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` if the header and one free node do not fit.
    pub const fn check_layout(buffer_size: usize) -> RegionResult<()> {
        if buffer_size < Self::HEADER_SIZE + Self::NODE_SIZE {
            return Err(RegionError::BufferTooSmall);
        }
        Ok(())
    }

    /// Creates an arena over `buf` holding a single free block that spans
    /// everything after the header.
    ///
    /// # Errors
    ///
    /// See [`Self::check_layout`].
    pub fn create(buf: &'a mut [u8]) -> RegionResult<Self> {
        Self::check_layout(buf.len())?;

        let begin = Self::HEADER_SIZE;
        let end = buf.len();
        let size = distance(begin, end);
        let mut arena = Self { buf };
        arena.set_node(begin, size, NIL);
        arena.store(&FreeListHeader {
            head: begin,
            begin,
            end,
            size,
        });

        tracing::debug!("free list created: {} usable bytes", size);
        Ok(arena)
    }

    /// Bytes a request of `requested` bytes actually occupies.
    ///
    /// Returns `None` if the padded size overflows.
    #[must_use]
    pub const fn padded_size(requested: usize) -> Option<usize> {
        let with_header = match requested.checked_add(Self::OBJECT_HEADER_SIZE) {
            Some(size) => size,
            None => return None,
        };
        match align_up(with_header, WORD) {
            Some(size) if size < Self::NODE_SIZE => Some(Self::NODE_SIZE),
            other => other,
        }
    }

    #[inline]
    fn header(&self) -> FreeListHeader {
        read_pod(self.buf, 0)
    }

    #[inline]
    fn store(&mut self, header: &FreeListHeader) {
        write_pod(self.buf, 0, header);
    }

    #[inline]
    fn node(&self, at: usize) -> FreeNode {
        read_pod(self.buf, at)
    }

    #[inline]
    fn set_node(&mut self, at: usize, size: usize, next: usize) {
        write_pod(self.buf, at, &FreeNode { size, next });
    }

    /// Most nodes a well-formed list can hold; every walk stops after this
    /// many steps even if a double free has closed a cycle.
    #[inline]
    const fn walk_limit(header: &FreeListHeader) -> usize {
        header.size / Self::NODE_SIZE
    }

    /// Points `prev` (or the head when `prev` is `NIL`) at `next`.
    fn relink(&mut self, header: &mut FreeListHeader, prev: usize, next: usize) {
        if prev == NIL {
            header.head = next;
        } else {
            write_word(self.buf, prev + WORD, next);
        }
    }

    /// Offset of the first usable byte.
    #[inline]
    #[must_use]
    pub fn begin(&self) -> usize {
        self.header().begin
    }

    /// Offset one past the last usable byte.
    #[inline]
    #[must_use]
    pub fn end(&self) -> usize {
        self.header().end
    }

    /// Allocates `requested` bytes.
    ///
    /// First fit in address order. A block is split when the remainder can
    /// hold a free node; otherwise the whole block is granted and its header
    /// records the larger size.
    ///
    /// # Returns
    ///
    /// A pointer to the payload, or `None` if no free block is large enough.
    pub fn alloc(&mut self, requested: usize) -> Option<RegionPtr> {
        let Some(padded) = Self::padded_size(requested) else {
            tracing::trace!("free list request of {} bytes overflows", requested);
            return None;
        };

        let mut header = self.header();
        let mut prev = NIL;
        let mut curr = header.head;

        for _ in 0..Self::walk_limit(&header) {
            if curr == NIL {
                break;
            }
            let node = self.node(curr);

            if node.size >= padded {
                let granted = if node.size - padded < Self::NODE_SIZE {
                    // The leftover could not host a node: hand out the whole block.
                    self.relink(&mut header, prev, node.next);
                    node.size
                } else {
                    let rest = curr + padded;
                    self.set_node(rest, node.size - padded, node.next);
                    self.relink(&mut header, prev, rest);
                    padded
                };

                write_word(self.buf, curr, granted);
                self.store(&header);
                return Some(RegionPtr::from_offset(curr + Self::OBJECT_HEADER_SIZE));
            }

            prev = curr;
            curr = node.next;
        }

        tracing::trace!(
            "free list cannot fit {} bytes ({} available)",
            padded,
            self.available()
        );
        None
    }

    /// Recovers the block behind a payload pointer as `(offset, size)`.
    fn locate(&self, ptr: RegionPtr) -> RegionResult<(usize, usize)> {
        let header = self.header();
        let at = ptr.offset();
        if !(header.begin <= at && at < header.end) {
            return Err(RegionError::OutOfBounds);
        }

        let block = at - Self::OBJECT_HEADER_SIZE;
        if block < header.begin {
            return Err(RegionError::OutOfBounds);
        }

        let size: usize = read_pod(self.buf, block);
        match block.checked_add(size) {
            Some(block_end) if size >= Self::NODE_SIZE && block_end <= header.end => {
                Ok((block, size))
            }
            _ => Err(RegionError::OutOfBounds),
        }
    }

    /// The granted size recorded for the allocation at `ptr`, header included.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if `ptr` does not address a plausible allocation.
    pub fn object_size(&self, ptr: RegionPtr) -> RegionResult<usize> {
        self.locate(ptr).map(|(_, size)| size)
    }

    /// Returns an allocation to the arena, merging it with any physically
    /// adjacent free block.
    ///
    /// Freeing the same pointer twice is not detected in release builds.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if `ptr` lies outside `[begin, end)`, the size recorded
    /// before it describes a block that does not fit in the arena, or the free
    /// list is corrupted so that no insertion point is reached.
    pub fn free(&mut self, ptr: RegionPtr) -> RegionResult<()> {
        let (block, size) = match self.locate(ptr) {
            Ok(found) => found,
            Err(err) => {
                tracing::debug!("free list free rejected at offset {}: {}", ptr.offset(), err);
                return Err(err);
            }
        };
        debug_assert!(
            !self.overlaps_free(block, size),
            "block at offset {block} overlaps a free block"
        );

        let mut header = self.header();
        if header.head == NIL {
            self.set_node(block, size, NIL);
            header.head = block;
        } else if block < header.head {
            self.prepend(&mut header, block, size);
        } else {
            let mut prev = header.head;
            let mut placed = false;
            for _ in 0..Self::walk_limit(&header) {
                let prev_node = self.node(prev);
                if prev_node.next == NIL {
                    self.append(prev, prev_node, block, size);
                    placed = true;
                    break;
                }
                if block < prev_node.next {
                    self.join(prev, prev_node, block, size);
                    placed = true;
                    break;
                }
                prev = prev_node.next;
            }
            if !placed {
                tracing::debug!(
                    "free list free at offset {}: no insertion point, list is corrupted",
                    ptr.offset()
                );
                return Err(RegionError::OutOfBounds);
            }
        }
        self.store(&header);

        Ok(())
    }

    /// `block` sits before the current head.
    fn prepend(&mut self, header: &mut FreeListHeader, block: usize, size: usize) {
        let head = self.node(header.head);
        if block + size == header.head {
            self.set_node(block, size + head.size, head.next);
        } else {
            self.set_node(block, size, header.head);
        }
        header.head = block;
    }

    /// `block` sits after `last`, the final free node.
    fn append(&mut self, last: usize, last_node: FreeNode, block: usize, size: usize) {
        if last + last_node.size == block {
            self.set_node(last, last_node.size + size, NIL);
        } else {
            self.set_node(block, size, NIL);
            write_word(self.buf, last + WORD, block);
        }
    }

    /// `block` sits strictly between `prev` and the node after it.
    fn join(&mut self, prev: usize, prev_node: FreeNode, block: usize, size: usize) {
        let curr = prev_node.next;
        let curr_node = self.node(curr);
        let touches_prev = prev + prev_node.size == block;
        let touches_curr = block + size == curr;

        match (touches_prev, touches_curr) {
            (true, true) => {
                self.set_node(prev, prev_node.size + size + curr_node.size, curr_node.next);
            }
            (true, false) => {
                self.set_node(prev, prev_node.size + size, curr);
            }
            (false, true) => {
                self.set_node(block, size + curr_node.size, curr_node.next);
                write_word(self.buf, prev + WORD, block);
            }
            (false, false) => {
                self.set_node(block, size, curr);
                write_word(self.buf, prev + WORD, block);
            }
        }
    }

    /// Iterates over the free blocks in address order.
    pub fn free_blocks(&self) -> impl Iterator<Item = FreeBlock> + '_ {
        let header = self.header();
        let mut curr = header.head;
        std::iter::from_fn(move || {
            if curr == NIL {
                return None;
            }
            let node = self.node(curr);
            let block = FreeBlock {
                offset: curr,
                size: node.size,
            };
            curr = node.next;
            Some(block)
        })
        // Bounds the walk even if a double free has closed a cycle.
        .take(Self::walk_limit(&header))
    }

    /// Number of free blocks. Walks the list.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.free_blocks().count()
    }

    /// Size of the largest free block, the biggest padded request that can
    /// currently succeed.
    #[must_use]
    pub fn largest_free_block(&self) -> usize {
        self.free_blocks().map(|block| block.size).max().unwrap_or(0)
    }

    fn overlaps_free(&self, block: usize, size: usize) -> bool {
        self.free_blocks()
            .any(|free| free.offset < block + size && block < free.offset + free.size)
    }
}

impl Region for FreeListArena<'_> {
    #[inline]
    fn size(&self) -> usize {
        self.header().size
    }

    /// Walks the free list and sums block sizes.
    fn available(&self) -> usize {
        self.free_blocks().map(|block| block.size).sum()
    }

    fn free_all(&mut self) {
        let mut header = self.header();
        self.set_node(header.begin, header.size, NIL);
        header.head = header.begin;
        self.store(&header);
        tracing::debug!("free list reset: {} bytes free", header.size);
    }

    fn bytes(&self, ptr: RegionPtr) -> Option<&[u8]> {
        let (block, size) = self.locate(ptr).ok()?;
        Some(&self.buf[ptr.offset()..block + size])
    }

    fn bytes_mut(&mut self, ptr: RegionPtr) -> Option<&mut [u8]> {
        let (block, size) = self.locate(ptr).ok()?;
        Some(&mut self.buf[ptr.offset()..block + size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE: usize = FreeListArena::NODE_SIZE;
    const HEADER: usize = FreeListArena::HEADER_SIZE;

    fn sizes(arena: &FreeListArena<'_>) -> Vec<usize> {
        arena.free_blocks().map(|block| block.size).collect()
    }

    #[test]
    fn test_create_rejects_small_buffer() {
        let mut buf = [0u8; HEADER + NODE - 1];
        assert_eq!(
            FreeListArena::create(&mut buf).unwrap_err(),
            RegionError::BufferTooSmall
        );
    }

    #[test]
    fn test_create_single_block() {
        let mut buf = [0u8; 256];
        let arena = FreeListArena::create(&mut buf).unwrap();
        assert_eq!(arena.size(), 256 - HEADER);
        assert_eq!(sizes(&arena), vec![256 - HEADER]);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_padding_rule() {
        assert_eq!(FreeListArena::padded_size(0), Some(NODE));
        assert_eq!(FreeListArena::padded_size(1), Some(NODE));
        assert_eq!(FreeListArena::padded_size(WORD), Some(NODE));
        assert_eq!(FreeListArena::padded_size(WORD + 1), Some(3 * WORD));
        assert_eq!(FreeListArena::padded_size(64), Some(64 + WORD));
        assert_eq!(FreeListArena::padded_size(usize::MAX), None);
        assert_eq!(FreeListArena::padded_size(usize::MAX - WORD), None);
    }

    #[test]
    fn test_alloc_splits_front() {
        let mut buf = [0u8; 256];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let ptr = arena.alloc(24).unwrap();

        assert_eq!(ptr.offset(), HEADER + WORD);
        assert_eq!(arena.object_size(ptr), Ok(32));
        assert_eq!(
            arena.free_blocks().collect::<Vec<_>>(),
            vec![FreeBlock {
                offset: HEADER + 32,
                size: 256 - HEADER - 32,
            }]
        );
    }

    #[test]
    fn test_exact_fit_unlinks_block() {
        let mut buf = [0u8; HEADER + 32];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let ptr = arena.alloc(32 - WORD).unwrap();
        assert_eq!(arena.object_size(ptr), Ok(32));
        assert_eq!(arena.free_block_count(), 0);
        assert!(arena.alloc(1).is_none());
    }

    #[test]
    fn test_whole_block_grant_records_full_size() {
        // Leftover of one word cannot host a node.
        let mut buf = [0u8; HEADER + 40];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let ptr = arena.alloc(24).unwrap();

        assert_eq!(FreeListArena::padded_size(24), Some(32));
        assert_eq!(arena.object_size(ptr), Ok(40));
        assert_eq!(arena.available(), 0);
        assert_eq!(arena.bytes(ptr).map(<[u8]>::len), Some(40 - WORD));
    }

    #[test]
    fn test_free_into_empty_list() {
        let mut buf = [0u8; HEADER + 32];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let ptr = arena.alloc(8).unwrap();
        let rest = arena.alloc(8).unwrap();
        assert_eq!(arena.free_block_count(), 0);

        arena.free(rest).unwrap();
        assert_eq!(sizes(&arena), vec![NODE]);
        arena.free(ptr).unwrap();
        assert_eq!(sizes(&arena), vec![32]);
    }

    #[test]
    fn test_prepend_without_merge() {
        let mut buf = [0u8; 256];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let a = arena.alloc(8).unwrap();
        let _b = arena.alloc(8).unwrap();

        arena.free(a).unwrap();
        let blocks: Vec<_> = arena.free_blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].offset, HEADER);
        assert!(blocks[0].offset < blocks[1].offset);
    }

    #[test]
    fn test_append_merges_with_last() {
        let mut buf = [0u8; HEADER + 64];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let a = arena.alloc(8).unwrap();
        let b = arena.alloc(8).unwrap();
        let c = arena.alloc(8).unwrap();
        let d = arena.alloc(8).unwrap();
        assert_eq!(arena.available(), 0);

        arena.free(b).unwrap();
        arena.free(c).unwrap();
        assert_eq!(sizes(&arena), vec![2 * NODE]);

        arena.free(a).unwrap();
        arena.free(d).unwrap();
        assert_eq!(sizes(&arena), vec![64]);
    }

    #[test]
    fn test_append_without_merge() {
        let mut buf = [0u8; HEADER + 64];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let a = arena.alloc(8).unwrap();
        let _b = arena.alloc(8).unwrap();
        let c = arena.alloc(8).unwrap();
        let _d = arena.alloc(8).unwrap();

        arena.free(a).unwrap();
        arena.free(c).unwrap();
        assert_eq!(sizes(&arena), vec![NODE, NODE]);
    }

    #[test]
    fn test_join_all_four_cases() {
        // Layout: a b c d e f g, each one node wide, all allocated.
        let mut buf = [0u8; HEADER + 7 * NODE];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let ptrs: Vec<_> = (0..7).map(|_| arena.alloc(1).unwrap()).collect();
        assert_eq!(arena.available(), 0);

        // Free a and g so every later free lands strictly between two nodes.
        arena.free(ptrs[0]).unwrap();
        arena.free(ptrs[6]).unwrap();
        assert_eq!(arena.free_block_count(), 2);

        // Neither neighbour free: plain splice.
        arena.free(ptrs[3]).unwrap();
        assert_eq!(sizes(&arena), vec![NODE, NODE, NODE]);

        // Left neighbour free only.
        arena.free(ptrs[1]).unwrap();
        assert_eq!(sizes(&arena), vec![2 * NODE, NODE, NODE]);

        // Right neighbour free only.
        arena.free(ptrs[5]).unwrap();
        assert_eq!(sizes(&arena), vec![2 * NODE, NODE, 2 * NODE]);

        // Both neighbours free: three blocks collapse into one.
        arena.free(ptrs[2]).unwrap();
        assert_eq!(sizes(&arena), vec![4 * NODE, 2 * NODE]);
        arena.free(ptrs[4]).unwrap();
        assert_eq!(sizes(&arena), vec![7 * NODE]);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_free_rejects_out_of_bounds() {
        let mut buf = [0u8; 256];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let _ptr = arena.alloc(16).unwrap();
        let before = arena.available();

        assert_eq!(
            arena.free(RegionPtr::from_offset(0)),
            Err(RegionError::OutOfBounds)
        );
        assert_eq!(
            arena.free(RegionPtr::from_offset(HEADER)),
            Err(RegionError::OutOfBounds)
        );
        assert_eq!(
            arena.free(RegionPtr::from_offset(256)),
            Err(RegionError::OutOfBounds)
        );
        assert_eq!(
            arena.free(RegionPtr::from_offset(usize::MAX)),
            Err(RegionError::OutOfBounds)
        );
        assert_eq!(arena.available(), before);
    }

    #[test]
    fn test_free_rejects_garbage_header() {
        let mut buf = [0u8; 256];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let ptr = arena.alloc(16).unwrap();
        arena.write(ptr, &0u64).unwrap();

        // A pointer into the payload reads the zeroed word as its size.
        assert_eq!(
            arena.free(ptr.byte_add(WORD)),
            Err(RegionError::OutOfBounds)
        );
        arena.free(ptr).unwrap();
        assert!(arena.is_empty());
    }

    #[test]
    fn test_free_all_collapses_everything() {
        let mut buf = [0u8; 256];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        for _ in 0..4 {
            arena.alloc(12).unwrap();
        }
        arena.free_all();
        assert_eq!(sizes(&arena), vec![256 - HEADER]);
        assert_eq!(arena.largest_free_block(), 256 - HEADER);
    }

    #[test]
    fn test_fragmentation_returns_none() {
        let mut buf = [0u8; HEADER + 4 * NODE];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let ptrs: Vec<_> = (0..4).map(|_| arena.alloc(1).unwrap()).collect();
        arena.free(ptrs[0]).unwrap();
        arena.free(ptrs[2]).unwrap();

        assert_eq!(arena.available(), 2 * NODE);
        assert_eq!(arena.largest_free_block(), NODE);
        assert!(arena.alloc(NODE).is_none());
        assert!(arena.alloc(1).is_some());
    }

    #[test]
    fn test_cyclic_list_walks_stay_bounded() {
        let mut buf = [0u8; 256];
        let mut arena = FreeListArena::create(&mut buf).unwrap();
        let a = arena.alloc(1).unwrap();
        let b = arena.alloc(1).unwrap();
        let c = arena.alloc(1).unwrap();
        arena.free(b).unwrap();

        // Point b's node at itself, as a double free would.
        let b_block = b.offset() - FreeListArena::OBJECT_HEADER_SIZE;
        arena.set_node(b_block, NODE, b_block);
        assert_eq!(arena.free_block_count(), (256 - HEADER) / NODE);

        assert!(arena.alloc(10_000).is_none());
        arena.free(a).unwrap();
        assert_eq!(arena.free(c), Err(RegionError::OutOfBounds));
    }
}
