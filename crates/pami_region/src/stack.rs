//! # Stack Arena
//!
//! LIFO bump allocator of fixed-size chunks. Only the most recent chunk can be
//! released; there is no per-object metadata, just a running offset.

use bytemuck::{Pod, Zeroable};

use crate::error::{RegionError, RegionResult};
use crate::region::{read_pod, write_pod, Region, RegionPtr};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct StackHeader {
    begin: usize,
    /// Bytes handed out, always a multiple of `chunk_size`.
    allocated: usize,
    chunk_size: usize,
    size: usize,
}

/// A fixed-chunk stack over a caller-supplied buffer.
///
/// # Thread Safety
///
/// Not synchronized. Use one stack per thread or wrap it in
/// [`Locked`](crate::sync::Locked).
///
/// # Example
///
/// ```rust
/// use pami_region::{Region, StackArena};
///
/// let mut buffer = [0u8; 128];
/// let mut stack = StackArena::create(&mut buffer, 16)?;
///
/// let frame = stack.alloc();
/// stack.write(frame, &[1u8; 16])?;
/// stack.free()?;
/// assert!(stack.is_empty());
/// # Ok::<(), pami_region::RegionError>(())
/// ```
#[derive(Debug)]
pub struct StackArena<'a> {
    buf: &'a mut [u8],
}

impl<'a> StackArena<'a> {
    /// Bytes reserved at the start of the buffer for the stack header.
    pub const HEADER_SIZE: usize = std::mem::size_of::<StackHeader>();

    /// Checks whether a buffer of `buffer_size` bytes can host a stack.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` if the header does not fit.
    pub const fn check_layout(buffer_size: usize) -> RegionResult<()> {
        if buffer_size < Self::HEADER_SIZE {
            return Err(RegionError::BufferTooSmall);
        }
        Ok(())
    }

    /// Creates an empty stack over `buf`.
    ///
    /// # Errors
    ///
    /// See [`Self::check_layout`].
    pub fn create(buf: &'a mut [u8], chunk_size: usize) -> RegionResult<Self> {
        Self::check_layout(buf.len())?;

        let size = buf.len() - Self::HEADER_SIZE;
        let mut stack = Self { buf };
        stack.store(&StackHeader {
            begin: Self::HEADER_SIZE,
            allocated: 0,
            chunk_size,
            size,
        });

        tracing::debug!("stack created: {} bytes in chunks of {}", size, chunk_size);
        Ok(stack)
    }

    #[inline]
    fn header(&self) -> StackHeader {
        read_pod(self.buf, 0)
    }

    #[inline]
    fn store(&mut self, header: &StackHeader) {
        write_pod(self.buf, 0, header);
    }

    /// Offset of the bottom of the stack.
    #[inline]
    #[must_use]
    pub fn begin(&self) -> usize {
        self.header().begin
    }

    /// Offset one past the last usable byte.
    #[inline]
    #[must_use]
    pub fn end(&self) -> usize {
        let header = self.header();
        header.begin + header.size
    }

    /// Size of every chunk in bytes.
    #[inline]
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.header().chunk_size
    }

    /// Pushes one chunk. This is a **O(1)** operation.
    ///
    /// No capacity check is made: the caller must not push onto a full stack
    /// (see [`Self::try_alloc`]). Debug builds assert on it.
    pub fn alloc(&mut self) -> RegionPtr {
        let mut header = self.header();
        debug_assert!(
            header.allocated + header.chunk_size <= header.size,
            "stack arena exhausted"
        );

        let top = header.begin + header.allocated;
        header.allocated += header.chunk_size;
        self.store(&header);

        RegionPtr::from_offset(top)
    }

    /// Pushes one chunk if a whole chunk remains.
    pub fn try_alloc(&mut self) -> Option<RegionPtr> {
        if self.available() < self.chunk_size() {
            tracing::trace!("stack exhausted: {} bytes in use", self.used());
            return None;
        }
        Some(self.alloc())
    }

    /// Pops the most recently pushed chunk.
    ///
    /// # Errors
    ///
    /// `StackEmpty` if nothing is allocated.
    pub fn free(&mut self) -> RegionResult<()> {
        let mut header = self.header();
        if header.allocated == 0 {
            tracing::debug!("stack free rejected: {}", RegionError::StackEmpty);
            return Err(RegionError::StackEmpty);
        }
        header.allocated -= header.chunk_size;
        self.store(&header);
        Ok(())
    }

    /// The most recently pushed chunk, if any.
    #[must_use]
    pub fn top(&self) -> Option<RegionPtr> {
        let header = self.header();
        if header.allocated == 0 {
            return None;
        }
        Some(RegionPtr::from_offset(
            header.begin + header.allocated - header.chunk_size,
        ))
    }

    /// Number of chunks currently pushed.
    #[must_use]
    pub fn depth(&self) -> usize {
        let header = self.header();
        header.allocated.checked_div(header.chunk_size).unwrap_or(0)
    }

    /// Validates that `at` is a pushed chunk and returns its range.
    fn chunk_range(&self, at: usize) -> Option<std::ops::Range<usize>> {
        let header = self.header();
        if header.chunk_size == 0 || at < header.begin {
            return None;
        }
        let rel = at - header.begin;
        if rel >= header.allocated || rel % header.chunk_size != 0 {
            return None;
        }
        let end = at + header.chunk_size;
        (end <= self.buf.len()).then_some(at..end)
    }
}

impl Region for StackArena<'_> {
    #[inline]
    fn size(&self) -> usize {
        self.header().size
    }

    #[inline]
    fn available(&self) -> usize {
        let header = self.header();
        header.size.saturating_sub(header.allocated)
    }

    fn free_all(&mut self) {
        let mut header = self.header();
        header.allocated = 0;
        self.store(&header);
        tracing::debug!("stack reset");
    }

    fn bytes(&self, ptr: RegionPtr) -> Option<&[u8]> {
        let range = self.chunk_range(ptr.offset())?;
        Some(&self.buf[range])
    }

    fn bytes_mut(&mut self, ptr: RegionPtr) -> Option<&mut [u8]> {
        let range = self.chunk_range(ptr.offset())?;
        Some(&mut self.buf[range])
    }
}
