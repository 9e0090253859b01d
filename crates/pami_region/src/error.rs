//! # Region Error Types
//!
//! All errors that arena construction and `free` can report.
//!
//! Running out of memory is not here: `alloc` returns `None` for that.

use thiserror::Error;

/// Errors reported by the arenas.
///
/// Construction-time errors (`NullBuffer`, `ChunkTooSmall`, `BufferTooSmall`)
/// only come out of `create`. The rest come out of `free`.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
#[non_exhaustive]
pub enum RegionError {
    /// The caller supplied no storage.
    #[error("buffer is null")]
    NullBuffer = 1,

    /// Chunk size cannot hold a free-list link.
    #[error("provided chunk size is too small")]
    ChunkTooSmall = 2,

    /// Buffer cannot hold the arena header plus one unit of storage.
    #[error("provided buffer is too small")]
    BufferTooSmall = 3,

    /// Pointer does not address storage owned by the arena.
    #[error("pointer is out of bounds")]
    OutOfBounds = 4,

    /// Pointer is inside the pool but not on a chunk boundary.
    #[error("pointer is out of alignment")]
    Misaligned = 5,

    /// `free` was called on a stack with nothing allocated.
    #[error("stack is empty")]
    StackEmpty = 6,
}

/// Result type for arena operations.
pub type RegionResult<T> = Result<T, RegionError>;

/// Code reserved for a successful operation.
pub const OK_CODE: u8 = 0;

const OK_MESSAGE: &str = "OK";
const UNKNOWN_MESSAGE: &str = "unknown error";

impl RegionError {
    /// Returns the numeric diagnostic code. Zero is never used.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Maps a numeric code back to an error.
    ///
    /// Returns `None` for [`OK_CODE`] and for codes no variant uses.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::NullBuffer),
            2 => Some(Self::ChunkTooSmall),
            3 => Some(Self::BufferTooSmall),
            4 => Some(Self::OutOfBounds),
            5 => Some(Self::Misaligned),
            6 => Some(Self::StackEmpty),
            _ => None,
        }
    }

    /// Static message for this error, identical to its `Display` output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NullBuffer => "buffer is null",
            Self::ChunkTooSmall => "provided chunk size is too small",
            Self::BufferTooSmall => "provided buffer is too small",
            Self::OutOfBounds => "pointer is out of bounds",
            Self::Misaligned => "pointer is out of alignment",
            Self::StackEmpty => "stack is empty",
        }
    }

    /// Whether the error can only be produced while creating an arena.
    #[inline]
    #[must_use]
    pub const fn is_construction_error(self) -> bool {
        matches!(
            self,
            Self::NullBuffer | Self::ChunkTooSmall | Self::BufferTooSmall
        )
    }
}

/// Describes any diagnostic code.
///
/// Total over `u8`: `0` is `"OK"`, known codes map to their error message and
/// everything else to `"unknown error"`.
#[must_use]
pub const fn describe(code: u8) -> &'static str {
    if code == OK_CODE {
        return OK_MESSAGE;
    }
    match RegionError::from_code(code) {
        Some(err) => err.as_str(),
        None => UNKNOWN_MESSAGE,
    }
}

/// Describes the outcome of a `free`-style operation.
#[must_use]
pub fn status_str(result: &RegionResult<()>) -> &'static str {
    match result {
        Ok(()) => OK_MESSAGE,
        Err(err) => err.as_str(),
    }
}

/// Errors raised while loading an arena layout file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML text could not be parsed into a layout.
    #[error("invalid layout file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The layout file could not be read.
    #[error("cannot read layout file: {0}")]
    Io(#[from] std::io::Error),

    /// The layout parsed but describes something unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// An arena in the layout would be rejected at creation.
    #[error("arena `{name}` rejected: {source}")]
    Region {
        /// Name of the offending arena.
        name: String,
        /// Construction error the arena would report.
        source: RegionError,
    },
}

/// Result type for layout loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
