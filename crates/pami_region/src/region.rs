//! # Region Primitives
//!
//! Bounds arithmetic, buffer-relative pointers and the operation set shared by
//! every arena.
//!
//! ## Layout
//!
//! ```text
//!  offset 0                begin                                   end   len
//!  ┌────────────────────────┬──────────────────────────────────────┬──────┐
//!  │ arena header (words)   │ usable storage (chunks / blocks)     │ pad  │
//!  └────────────────────────┴──────────────────────────────────────┴──────┘
//! ```
//!
//! Headers and free-list nodes are `#[repr(C)]` Pod structs copied in and out
//! of the caller's bytes with unaligned reads, so the buffer itself may sit at
//! any address.

use bytemuck::Pod;

use crate::error::{RegionError, RegionResult};

/// Machine word width. Sizes, links and headers are all made of words.
pub const WORD: usize = std::mem::size_of::<usize>();

/// Link value meaning "no next node".
pub(crate) const NIL: usize = usize::MAX;

/// A pointer into an arena, expressed as a byte offset from the start of the
/// caller's buffer.
///
/// Offsets below the arena header are never handed out, so any value can be
/// passed back to `free` and is validated there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct RegionPtr(usize);

impl RegionPtr {
    /// Creates a pointer from a raw buffer offset.
    #[inline]
    #[must_use]
    pub const fn from_offset(offset: usize) -> Self {
        Self(offset)
    }

    /// Returns the byte offset from the start of the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }

    /// Returns a pointer `bytes` further into the buffer, saturating at `usize::MAX`.
    #[inline]
    #[must_use]
    pub const fn byte_add(self, bytes: usize) -> Self {
        Self(self.0.saturating_add(bytes))
    }
}

/// Absolute distance between two offsets in the same buffer.
#[inline]
#[must_use]
pub const fn distance(a: usize, b: usize) -> usize {
    a.abs_diff(b)
}

/// Rounds `value` up to the next multiple of `align`.
///
/// `align` must be a power of two. Returns `None` on overflow.
#[inline]
#[must_use]
pub const fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(bumped) => Some(bumped & !(align - 1)),
        None => None,
    }
}

/// Reads a Pod value stored at `offset`.
#[inline]
pub(crate) fn read_pod<T: Pod>(buf: &[u8], offset: usize) -> T {
    bytemuck::pod_read_unaligned(&buf[offset..offset + std::mem::size_of::<T>()])
}

/// Writes a Pod value at `offset`.
#[inline]
pub(crate) fn write_pod<T: Pod>(buf: &mut [u8], offset: usize, value: &T) {
    buf[offset..offset + std::mem::size_of::<T>()].copy_from_slice(bytemuck::bytes_of(value));
}

#[inline]
pub(crate) fn read_word(buf: &[u8], offset: usize) -> usize {
    read_pod(buf, offset)
}

#[inline]
pub(crate) fn write_word(buf: &mut [u8], offset: usize, value: usize) {
    write_pod(buf, offset, &value);
}

/// Operations every arena supports.
///
/// `alloc` and `free` are not part of the trait because their parameters
/// differ per arena (a pool takes no size, a stack frees no pointer).
pub trait Region {
    /// Total usable bytes, header and trailing pad excluded.
    fn size(&self) -> usize;

    /// Bytes currently free.
    fn available(&self) -> usize;

    /// Bytes currently handed out. Always `size() - available()`.
    fn used(&self) -> usize {
        self.size() - self.available()
    }

    /// True when nothing is allocated.
    fn is_empty(&self) -> bool {
        self.available() == self.size()
    }

    /// Releases every outstanding allocation at once.
    ///
    /// Pointers handed out before the reset must not be used afterwards.
    fn free_all(&mut self);

    /// The bytes owned by the allocation at `ptr`, or `None` if `ptr` does not
    /// address one.
    fn bytes(&self, ptr: RegionPtr) -> Option<&[u8]>;

    /// Mutable counterpart of [`Region::bytes`].
    fn bytes_mut(&mut self, ptr: RegionPtr) -> Option<&mut [u8]>;

    /// Reads a `T` from the start of the allocation at `ptr`.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if `ptr` is not an allocation or `T` does not fit in it.
    fn read<T: Pod>(&self, ptr: RegionPtr) -> RegionResult<T>
    where
        Self: Sized,
    {
        self.bytes(ptr)
            .and_then(|bytes| bytes.get(..std::mem::size_of::<T>()))
            .map(bytemuck::pod_read_unaligned)
            .ok_or(RegionError::OutOfBounds)
    }

    /// Writes `value` to the start of the allocation at `ptr`.
    ///
    /// # Errors
    ///
    /// `OutOfBounds` if `ptr` is not an allocation or `T` does not fit in it.
    fn write<T: Pod>(&mut self, ptr: RegionPtr, value: &T) -> RegionResult<()>
    where
        Self: Sized,
    {
        let dst = self
            .bytes_mut(ptr)
            .and_then(|bytes| bytes.get_mut(..std::mem::size_of::<T>()))
            .ok_or(RegionError::OutOfBounds)?;
        dst.copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }
}
