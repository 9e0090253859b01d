//! # PAMI Region
//!
//! Memory management for the PAMI interpreter inside one caller-supplied,
//! fixed-size byte buffer.
//!
//! ## Arenas
//!
//! | Arena             | Unit           | Free order        | Typical user |
//! |-------------------|----------------|-------------------|--------------|
//! | [`PoolArena`]     | fixed chunk    | any, FIFO reuse   | lexer        |
//! | [`FreeListArena`] | any size       | any, coalescing   | evaluator    |
//! | [`StackArena`]    | fixed chunk    | LIFO only         | call frames  |
//!
//! ## Rules
//!
//! 1. **Caller-owned storage** - an arena borrows its buffer and never grows it
//! 2. **In-band bookkeeping** - headers and free lists live in the buffer itself
//! 3. **Exhaustion is not an error** - `alloc` returns `None` when full
//! 4. **Misuse is a caller obligation** - double frees and stale pointers are
//!    not reported; debug builds assert where it is cheap to notice
//!
//! ## Example
//!
//! ```rust
//! use pami_region::{FreeListArena, PoolArena, Region};
//!
//! let mut lexemes = [0u8; 1024];
//! let mut pool = PoolArena::create(&mut lexemes, 32)?;
//! let token = pool.alloc().expect("room for a token");
//! pool.write(token, &[7u8; 32])?;
//!
//! let mut cells = [0u8; 4096];
//! let mut heap = FreeListArena::create(&mut cells)?;
//! let cell = heap.alloc(40).expect("room for a cell");
//! heap.free(cell)?;
//!
//! assert_eq!(pool.used(), 32);
//! assert!(heap.is_empty());
//! # Ok::<(), pami_region::RegionError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod arena;
pub mod config;
pub mod error;
pub mod freelist;
pub mod pool;
pub mod region;
pub mod stack;
pub mod sync;

pub use arena::{Arena, ArenaKind};
pub use config::{ArenaConfig, ArenaLayout, RegionConfig};
pub use error::{
    describe, status_str, ConfigError, ConfigResult, RegionError, RegionResult, OK_CODE,
};
pub use freelist::{FreeBlock, FreeListArena};
pub use pool::PoolArena;
pub use region::{align_up, distance, Region, RegionPtr, WORD};
pub use stack::StackArena;
pub use sync::Locked;
