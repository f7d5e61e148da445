// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use core::error::Error;
use core::fmt::{self, Display, Formatter};

/// Common error type for all big-array operations.
///
/// Every variant describes a condition that is fatal for the current
/// call and leaves the collection and map state unchanged. Bugs inside
/// the crate itself (broken internal invariants) panic instead of
/// returning one of these.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum BigArrayError {
    /// The default block size would exceed the maximum block size.
    ///
    /// Raised by the size setters; `default_block_size <=
    /// max_block_size` must hold at all times.
    BlockSizeOrder {
        /// Requested default block size.
        default_block_size: usize,

        /// Maximum block size in effect.
        max_block_size: usize,
    },

    /// A global element index that no block in the searched window
    /// contains.
    ElementOutOfRange {
        /// Global element index.
        index: usize,
    },

    /// A logical element range that walks outside the sequence.
    ///
    /// Returned when the range arithmetic itself is impossible, for
    /// example a reverse range that extends before the first element.
    RangeOutOfBounds {
        /// Anchor element index of the range.
        index: usize,

        /// Number of elements in the range.
        count: usize,
    },

    /// A sub-range of a slice argument that goes out of bounds.
    SliceRangeOutOfBounds {
        /// Offset of the sub-range within the slice.
        offset: usize,

        /// Number of elements in the sub-range.
        count: usize,

        /// Length of the slice.
        len: usize,
    },

    /// A block position outside the block chain.
    BlockIndexOutOfRange {
        /// Requested block position.
        index: usize,

        /// Number of blocks in the chain.
        block_count: usize,
    },

    /// An insertion position past the end of the block chain.
    ///
    /// Unlike [`BigArrayError::BlockIndexOutOfRange`], the position one
    /// past the last block is accepted.
    InsertIndexOutOfRange {
        /// Requested insertion position.
        index: usize,

        /// Number of blocks in the chain.
        block_count: usize,
    },

    /// A block-range search window that is not contained in the chain.
    SearchRangeOutOfBounds {
        /// First block position of the window.
        index: usize,

        /// Number of blocks in the window.
        count: usize,

        /// Number of blocks in the chain.
        block_count: usize,
    },
}

impl Display for BigArrayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockSizeOrder {
                default_block_size,
                max_block_size,
            } => write!(
                f,
                "default block size {default_block_size} exceeds max block size {max_block_size}"
            ),
            Self::ElementOutOfRange { index } => {
                write!(f, "no block contains element index {index}")
            }
            Self::RangeOutOfBounds { index, count } => write!(
                f,
                "range of {count} elements at index {index} leaves the sequence"
            ),
            Self::SliceRangeOutOfBounds { offset, count, len } => write!(
                f,
                "sub-range of {count} elements at offset {offset} is outside a slice of length {len}"
            ),
            Self::BlockIndexOutOfRange { index, block_count } => write!(
                f,
                "block position {index} is outside a chain of {block_count} blocks"
            ),
            Self::InsertIndexOutOfRange { index, block_count } => write!(
                f,
                "insert position {index} is past the end of a chain of {block_count} blocks"
            ),
            Self::SearchRangeOutOfBounds {
                index,
                count,
                block_count,
            } => write!(
                f,
                "search window of {count} blocks at position {index} is outside a chain of {block_count} blocks"
            ),
        }
    }
}

impl Error for BigArrayError {}
