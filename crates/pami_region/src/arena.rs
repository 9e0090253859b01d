//! # Arena Variants
//!
//! One sum type over the three allocators, for callers that pick the arena
//! kind at runtime (typically from a layout file).

use serde::{Deserialize, Serialize};

use crate::freelist::FreeListArena;
use crate::pool::PoolArena;
use crate::region::{Region, RegionPtr};
use crate::stack::StackArena;

/// Which allocator an arena uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArenaKind {
    /// Fixed-size chunks, FIFO reuse.
    Pool,
    /// Variable-size blocks with coalescing.
    FreeList,
    /// Fixed-size chunks, LIFO only.
    Stack,
}

impl std::fmt::Display for ArenaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pool => "pool",
            Self::FreeList => "freelist",
            Self::Stack => "stack",
        })
    }
}

/// Any one of the three arenas.
#[derive(Debug)]
pub enum Arena<'a> {
    /// A [`PoolArena`].
    Pool(PoolArena<'a>),
    /// A [`FreeListArena`].
    FreeList(FreeListArena<'a>),
    /// A [`StackArena`].
    Stack(StackArena<'a>),
}

macro_rules! delegate {
    ($self:expr, $arena:ident => $body:expr) => {
        match $self {
            Arena::Pool($arena) => $body,
            Arena::FreeList($arena) => $body,
            Arena::Stack($arena) => $body,
        }
    };
}

impl<'a> Arena<'a> {
    /// The allocator behind this arena.
    #[must_use]
    pub const fn kind(&self) -> ArenaKind {
        match self {
            Self::Pool(_) => ArenaKind::Pool,
            Self::FreeList(_) => ArenaKind::FreeList,
            Self::Stack(_) => ArenaKind::Stack,
        }
    }

    /// The pool, if this is one.
    #[must_use]
    pub fn as_pool(&self) -> Option<&PoolArena<'a>> {
        match self {
            Self::Pool(pool) => Some(pool),
            _ => None,
        }
    }

    /// Mutable access to the pool, if this is one.
    pub fn as_pool_mut(&mut self) -> Option<&mut PoolArena<'a>> {
        match self {
            Self::Pool(pool) => Some(pool),
            _ => None,
        }
    }

    /// The free-list arena, if this is one.
    #[must_use]
    pub fn as_freelist(&self) -> Option<&FreeListArena<'a>> {
        match self {
            Self::FreeList(heap) => Some(heap),
            _ => None,
        }
    }

    /// Mutable access to the free-list arena, if this is one.
    pub fn as_freelist_mut(&mut self) -> Option<&mut FreeListArena<'a>> {
        match self {
            Self::FreeList(heap) => Some(heap),
            _ => None,
        }
    }

    /// The stack, if this is one.
    #[must_use]
    pub fn as_stack(&self) -> Option<&StackArena<'a>> {
        match self {
            Self::Stack(stack) => Some(stack),
            _ => None,
        }
    }

    /// Mutable access to the stack, if this is one.
    pub fn as_stack_mut(&mut self) -> Option<&mut StackArena<'a>> {
        match self {
            Self::Stack(stack) => Some(stack),
            _ => None,
        }
    }
}

impl Region for Arena<'_> {
    fn size(&self) -> usize {
        delegate!(self, arena => arena.size())
    }

    fn available(&self) -> usize {
        delegate!(self, arena => arena.available())
    }

    fn free_all(&mut self) {
        delegate!(self, arena => arena.free_all());
    }

    fn bytes(&self, ptr: RegionPtr) -> Option<&[u8]> {
        delegate!(self, arena => arena.bytes(ptr))
    }

    fn bytes_mut(&mut self, ptr: RegionPtr) -> Option<&mut [u8]> {
        delegate!(self, arena => arena.bytes_mut(ptr))
    }
}

impl<'a> From<PoolArena<'a>> for Arena<'a> {
    fn from(pool: PoolArena<'a>) -> Self {
        Self::Pool(pool)
    }
}

impl<'a> From<FreeListArena<'a>> for Arena<'a> {
    fn from(heap: FreeListArena<'a>) -> Self {
        Self::FreeList(heap)
    }
}

impl<'a> From<StackArena<'a>> for Arena<'a> {
    fn from(stack: StackArena<'a>) -> Self {
        Self::Stack(stack)
    }
}
