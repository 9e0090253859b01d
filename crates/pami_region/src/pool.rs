//! # Pool Arena
//!
//! Fixed-size chunk allocator for records that are allocated and freed
//! individually, such as lexemes.
//!
//! The free list is threaded through the free chunks themselves: the first
//! word of every free chunk holds the offset of the next one. Allocated chunks
//! carry no metadata at all.
//!
//! ```text
//!  header │ chunk 0 │ chunk 1 │ chunk 2 │ ... │ chunk n-1 │ pad
//!  head ──────┘ next ───┘ next ──┘
//! ```
//!
//! Allocation pops the head and freeing appends to the tail, so chunks are
//! reused in FIFO order.

use bytemuck::{Pod, Zeroable};

use crate::error::{RegionError, RegionResult};
use crate::region::{distance, read_pod, read_word, write_pod, write_word, Region, RegionPtr, NIL, WORD};

/// Bookkeeping stored in the first bytes of the buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct PoolHeader {
    head: usize,
    tail: usize,
    begin: usize,
    /// First byte past the last whole chunk.
    end: usize,
    chunk_size: usize,
    size: usize,
}

/// A pool of equal-size chunks carved out of a caller-supplied buffer.
///
/// # Thread Safety
///
/// Not synchronized. Use one pool per thread or wrap it in
/// [`Locked`](crate::sync::Locked).
///
/// # Example
///
/// ```rust
/// use pami_region::{PoolArena, Region};
///
/// let mut buffer = [0u8; 256];
/// let mut pool = PoolArena::create(&mut buffer, 16)?;
///
/// let chunk = pool.alloc().expect("pool has room");
/// pool.write(chunk, &42u64)?;
/// assert_eq!(pool.read::<u64>(chunk)?, 42);
///
/// pool.free(chunk)?;
/// assert!(pool.is_empty());
/// # Ok::<(), pami_region::RegionError>(())
/// ```
#[derive(Debug)]
pub struct PoolArena<'a> {
    buf: &'a mut [u8],
}

impl<'a> PoolArena<'a> {
    /// Bytes reserved at the start of the buffer for the pool header.
    pub const HEADER_SIZE: usize = std::mem::size_of::<PoolHeader>();

    /// Smallest chunk that can hold a free-list link.
    pub const MIN_CHUNK_SIZE: usize = WORD;

    /// Checks whether a buffer of `buffer_size` bytes can host a pool of
    /// `chunk_size` chunks, without touching any memory.
    ///
    /// # Errors
    ///
    /// * `NullBuffer` - `buffer_size` is zero
    /// * `ChunkTooSmall` - `chunk_size` is below [`Self::MIN_CHUNK_SIZE`]
    /// * `BufferTooSmall` - not even one chunk fits after the header
    pub const fn check_layout(buffer_size: usize, chunk_size: usize) -> RegionResult<()> {
        if buffer_size == 0 {
            return Err(RegionError::NullBuffer);
        }
        if chunk_size < Self::MIN_CHUNK_SIZE {
            return Err(RegionError::ChunkTooSmall);
        }
        match Self::HEADER_SIZE.checked_add(chunk_size) {
            Some(needed) if buffer_size >= needed => Ok(()),
            _ => Err(RegionError::BufferTooSmall),
        }
    }

    /// Creates a pool over `buf`.
    ///
    /// Usable memory is zero-filled and every whole chunk that fits after the
    /// header goes on the free list. A remainder smaller than one chunk is left
    /// as permanent padding past [`end`](Self::end).
    ///
    /// # Errors
    ///
    /// See [`Self::check_layout`].
    pub fn create(buf: &'a mut [u8], chunk_size: usize) -> RegionResult<Self> {
        Self::check_layout(buf.len(), chunk_size)?;

        let begin = Self::HEADER_SIZE;
        buf[begin..].fill(0);

        let mut pool = Self { buf };
        pool.set_list(chunk_size);

        tracing::debug!(
            "pool created: {} chunks of {} bytes, {} bytes padding",
            pool.chunk_count(),
            chunk_size,
            pool.buf.len() - pool.end()
        );
        Ok(pool)
    }

    #[inline]
    fn header(&self) -> PoolHeader {
        read_pod(self.buf, 0)
    }

    #[inline]
    fn store(&mut self, header: &PoolHeader) {
        write_pod(self.buf, 0, header);
    }

    /// Links every whole chunk into the free list, in address order.
    fn set_list(&mut self, chunk_size: usize) {
        let begin = Self::HEADER_SIZE;
        let count = (self.buf.len() - begin) / chunk_size;
        let end = begin + count * chunk_size;

        for index in 0..count {
            let at = begin + index * chunk_size;
            let next = if index + 1 < count { at + chunk_size } else { NIL };
            write_word(self.buf, at, next);
        }

        self.store(&PoolHeader {
            head: begin,
            tail: end - chunk_size,
            begin,
            end,
            chunk_size,
            size: distance(begin, end),
        });
    }

    /// Offset of the first chunk.
    #[inline]
    #[must_use]
    pub fn begin(&self) -> usize {
        self.header().begin
    }

    /// Offset one past the last whole chunk.
    #[inline]
    #[must_use]
    pub fn end(&self) -> usize {
        self.header().end
    }

    /// Size of every chunk in bytes.
    #[inline]
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.header().chunk_size
    }

    /// Number of chunks the pool manages.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        let header = self.header();
        header.size / header.chunk_size
    }

    /// Allocates one chunk.
    ///
    /// This is a **O(1)** operation. The chunk's contents are whatever was
    /// left there; the caller owns all of its bytes until it is freed.
    ///
    /// # Returns
    ///
    /// The chunk, or `None` if every chunk is in use.
    pub fn alloc(&mut self) -> Option<RegionPtr> {
        let mut header = self.header();
        if header.head == NIL {
            tracing::trace!("pool exhausted: {} chunks in use", header.size / header.chunk_size);
            return None;
        }

        let chunk = header.head;
        header.head = read_word(self.buf, chunk);
        if header.head == NIL {
            header.tail = NIL;
        }
        self.store(&header);

        Some(RegionPtr::from_offset(chunk))
    }

    /// Validates that `at` is a chunk boundary inside the pool.
    fn check_chunk(header: &PoolHeader, at: usize) -> RegionResult<()> {
        if !(header.begin <= at && at < header.end) {
            return Err(RegionError::OutOfBounds);
        }
        if distance(at, header.begin) % header.chunk_size != 0 {
            return Err(RegionError::Misaligned);
        }
        Ok(())
    }

    /// Returns a chunk to the pool. This is a **O(1)** operation.
    ///
    /// The chunk joins the tail of the free list, so it is handed out again
    /// only after every chunk already free.
    ///
    /// Freeing a chunk that is already free is not detected in release builds
    /// and corrupts the free list.
    ///
    /// # Errors
    ///
    /// * `OutOfBounds` - `ptr` is outside `[begin, end)`
    /// * `Misaligned` - `ptr` is not on a chunk boundary
    pub fn free(&mut self, ptr: RegionPtr) -> RegionResult<()> {
        let mut header = self.header();
        let at = ptr.offset();

        if let Err(err) = Self::check_chunk(&header, at) {
            tracing::debug!("pool free rejected at offset {}: {}", at, err);
            return Err(err);
        }
        debug_assert!(!self.is_free(ptr), "chunk at offset {at} freed twice");

        write_word(self.buf, at, NIL);
        if header.head == NIL {
            header.head = at;
        } else {
            write_word(self.buf, header.tail, at);
        }
        header.tail = at;
        self.store(&header);

        Ok(())
    }

    /// Iterates over the free chunks, head first.
    pub fn free_chunks(&self) -> impl Iterator<Item = RegionPtr> + '_ {
        let header = self.header();
        let mut curr = header.head;
        std::iter::from_fn(move || {
            if curr == NIL {
                return None;
            }
            let chunk = curr;
            curr = read_word(self.buf, chunk);
            Some(RegionPtr::from_offset(chunk))
        })
        // A list longer than the pool can only come from a double free.
        .take(header.size / header.chunk_size)
    }

    /// Number of chunks on the free list. Walks the list.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.free_chunks().count()
    }

    /// Whether the chunk at `ptr` is currently on the free list. Walks the list.
    #[must_use]
    pub fn is_free(&self, ptr: RegionPtr) -> bool {
        self.free_chunks().any(|chunk| chunk == ptr)
    }
}

impl Region for PoolArena<'_> {
    #[inline]
    fn size(&self) -> usize {
        self.header().size
    }

    /// Walks the free list, O(n) in free chunks.
    fn available(&self) -> usize {
        self.free_block_count() * self.chunk_size()
    }

    fn free_all(&mut self) {
        let chunk_size = self.chunk_size();
        self.set_list(chunk_size);
        tracing::debug!("pool reset: {} chunks free", self.chunk_count());
    }

    fn bytes(&self, ptr: RegionPtr) -> Option<&[u8]> {
        let header = self.header();
        let at = ptr.offset();
        Self::check_chunk(&header, at).ok()?;
        Some(&self.buf[at..at + header.chunk_size])
    }

    fn bytes_mut(&mut self, ptr: RegionPtr) -> Option<&mut [u8]> {
        let header = self.header();
        let at = ptr.offset();
        Self::check_chunk(&header, at).ok()?;
        Some(&mut self.buf[at..at + header.chunk_size])
    }
}
