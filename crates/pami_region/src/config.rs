//! # Arena Layout Files
//!
//! Arena sizes are balance data, not code: they are loaded once at startup
//! from a TOML file.
//!
//! ```toml
//! [[arena]]
//! name = "lexemes"
//! kind = "pool"
//! buffer_size = 4096
//! chunk_size = 32
//!
//! [[arena]]
//! name = "cells"
//! kind = "freelist"
//! buffer_size = 65536
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arena::{Arena, ArenaKind};
use crate::error::{ConfigError, ConfigResult, RegionError, RegionResult};
use crate::freelist::FreeListArena;
use crate::pool::PoolArena;
use crate::stack::StackArena;

/// Allocator choice for one arena, tagged by `kind` in the layout file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArenaLayout {
    /// Fixed-size chunks, FIFO reuse.
    Pool {
        /// Size of every chunk in bytes.
        chunk_size: usize,
    },
    /// Variable-size blocks with coalescing.
    FreeList,
    /// Fixed-size chunks, LIFO only.
    Stack {
        /// Size of every frame in bytes.
        chunk_size: usize,
    },
}

impl ArenaLayout {
    /// The allocator this layout selects.
    #[must_use]
    pub const fn kind(self) -> ArenaKind {
        match self {
            Self::Pool { .. } => ArenaKind::Pool,
            Self::FreeList => ArenaKind::FreeList,
            Self::Stack { .. } => ArenaKind::Stack,
        }
    }

    /// Chunk size, for the allocators that take one.
    #[must_use]
    pub const fn chunk_size(self) -> Option<usize> {
        match self {
            Self::Pool { chunk_size } | Self::Stack { chunk_size } => Some(chunk_size),
            Self::FreeList => None,
        }
    }
}

/// Layout of a single arena.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Name the arena is looked up by.
    pub name: String,
    /// Total buffer size in bytes, header included.
    pub buffer_size: usize,
    /// Allocator and its parameters.
    #[serde(flatten)]
    pub layout: ArenaLayout,
}

impl ArenaConfig {
    /// The allocator this arena uses.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ArenaKind {
        self.layout.kind()
    }

    /// Runs the allocator's construction checks against this layout.
    ///
    /// # Errors
    ///
    /// `Region` if the allocator would reject the buffer or chunk size.
    pub fn check(&self) -> ConfigResult<()> {
        let verdict = match self.layout {
            ArenaLayout::Pool { chunk_size } => {
                PoolArena::check_layout(self.buffer_size, chunk_size)
            }
            ArenaLayout::FreeList => FreeListArena::check_layout(self.buffer_size),
            ArenaLayout::Stack { .. } => StackArena::check_layout(self.buffer_size),
        };
        verdict.map_err(|source| ConfigError::Region {
            name: self.name.clone(),
            source,
        })
    }

    /// Allocates a zeroed buffer of `buffer_size` bytes for this arena.
    ///
    /// This is the only place the crate uses the global allocator, and only
    /// on the caller's explicit request.
    #[must_use]
    pub fn allocate_buffer(&self) -> Box<[u8]> {
        vec![0u8; self.buffer_size].into_boxed_slice()
    }

    /// Creates the arena over the first `buffer_size` bytes of `buf`.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` if `buf` is shorter than `buffer_size`, otherwise
    /// whatever the allocator's `create` reports.
    pub fn open<'a>(&self, buf: &'a mut [u8]) -> RegionResult<Arena<'a>> {
        let buf = buf
            .get_mut(..self.buffer_size)
            .ok_or(RegionError::BufferTooSmall)?;

        let arena: Arena<'a> = match self.layout {
            ArenaLayout::Pool { chunk_size } => PoolArena::create(buf, chunk_size)?.into(),
            ArenaLayout::FreeList => FreeListArena::create(buf)?.into(),
            ArenaLayout::Stack { chunk_size } => StackArena::create(buf, chunk_size)?.into(),
        };
        tracing::debug!("arena `{}` opened as {}", self.name, self.kind());
        Ok(arena)
    }
}

/// A set of arena layouts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Arena layouts, in file order.
    #[serde(rename = "arena", default)]
    pub arenas: Vec<ArenaConfig>,
}

impl RegionConfig {
    /// Parses and validates a layout from TOML text.
    ///
    /// # Errors
    ///
    /// `Parse` for malformed TOML, otherwise see [`Self::validate`].
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a layout file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, otherwise see [`Self::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            "loaded {} arena layouts from {}",
            config.arenas.len(),
            path.as_ref().display()
        );
        Ok(config)
    }

    /// Serializes the layout back to TOML.
    ///
    /// # Errors
    ///
    /// `Invalid` if serialization fails.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string(self).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Checks that names are present and unique and that every arena would be
    /// accepted by its allocator.
    ///
    /// # Errors
    ///
    /// `Invalid` for naming problems, or the first failing [`ArenaConfig::check`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::with_capacity(self.arenas.len());
        for arena in &self.arenas {
            if arena.name.is_empty() {
                return Err(ConfigError::Invalid("arena with empty name".to_string()));
            }
            if !seen.insert(arena.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate arena name `{}`",
                    arena.name
                )));
            }
            arena.check()?;
        }
        Ok(())
    }

    /// Looks up an arena layout by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArenaConfig> {
        self.arenas.iter().find(|arena| arena.name == name)
    }

    /// Sum of all buffer sizes.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.arenas.iter().map(|arena| arena.buffer_size).sum()
    }
}
