// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::balancer::Balancer;
use crate::block_collection::BlockCollection;
use crate::block_store::BlockStore;
use crate::error::BigArrayError;
use crate::range::{BlockRange, MultiblockRange, Range};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::{self, Debug, Formatter};
use spin::Mutex;

/// Positional description of one block of a chain.
///
/// Entry `i` of the map's cache, when valid, truthfully describes the
/// block at chain position `i`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockInfo {
    /// Chain position of the block.
    pub block_index: usize,

    /// Global index of the block's first element.
    pub start_index: usize,

    /// Number of elements in the block.
    pub count: usize,
}

impl BlockInfo {
    /// Describe the block at chain position `block_index`, whose first
    /// element has global index `start_index` and which holds `count`
    /// elements.
    #[inline]
    #[must_use]
    pub const fn new(
        block_index: usize,
        start_index: usize,
        count: usize,
    ) -> Self {
        Self {
            block_index,
            start_index,
            count,
        }
    }

    /// Returns `true` if the described block contains the element at
    /// global `index`.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.start_index <= index && index < self.start_index + self.count
    }
}

/// Memo of the element count covered by the currently-valid cache
/// prefix, keyed by the watermark it was computed under.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct CachedCount {
    first_changed_block: Option<usize>,
    count: usize,
}

/// Cache state of an [`ArrayMap`], guarded by the map's lock.
struct MapState {
    /// Ordered cache of [`BlockInfo`] entries. Entries at positions
    /// below the watermark are valid; entries at or above it are
    /// obsolete and are discarded before the cache is extended.
    blocks_info: Vec<BlockInfo>,

    /// Smallest chain position whose cached entry is stale, or `None`
    /// if the whole cache is current.
    first_changed_block: Option<usize>,

    /// Memo for [`MapState::cached_element_count`]; `None` when stale.
    cached_count: Option<CachedCount>,
}

/// Translator from global element indexes to blocks of a
/// [`BlockCollection`].
///
/// The map keeps a lazily-built prefix-sum cache over the chain.
/// Queries inside the already-cached prefix are answered by an
/// interpolation search; queries beyond it extend the cache by
/// scanning block lengths. The map holds no reference to the chain:
/// queries borrow it per call, and the owning facade reports every
/// structural mutation through [`data_changed`] or
/// [`data_changed_after_removal`] so stale cache entries are never
/// trusted.
///
/// All cache state sits behind a single lock which every public
/// operation holds for its whole duration, so a map shared between
/// threads stays consistent as long as chain mutation is serialized
/// with the queries by the caller.
///
/// The balancer passed at construction is kept for future size
/// decisions; the query algorithms do not consult it. It is stored as
/// `Box<dyn Balancer>` to keep the map convenient to pass around.
///
/// [`data_changed`]: ArrayMap::data_changed
/// [`data_changed_after_removal`]: ArrayMap::data_changed_after_removal
pub struct ArrayMap {
    balancer: Box<dyn Balancer>,
    state: Mutex<MapState>,
}

impl ArrayMap {
    /// Create a map for `blocks`.
    ///
    /// A non-empty chain starts fully unmapped; the cache fills in as
    /// queries arrive.
    pub fn new<T, S: BlockStore<T>>(
        balancer: Box<dyn Balancer>,
        blocks: &BlockCollection<T, S>,
    ) -> Self {
        let first_changed_block =
            if blocks.is_empty() { None } else { Some(0) };
        Self {
            balancer,
            state: Mutex::new(MapState {
                blocks_info: Vec::new(),
                first_changed_block,
                cached_count: None,
            }),
        }
    }

    /// The size strategy this map was created with.
    #[must_use]
    pub fn balancer(&self) -> &dyn Balancer {
        &*self.balancer
    }

    /// Find the block containing the element at global `index`.
    pub fn block_info<T, S: BlockStore<T>>(
        &self,
        blocks: &BlockCollection<T, S>,
        index: usize,
    ) -> Result<BlockInfo, BigArrayError> {
        self.state
            .lock()
            .block_info(blocks, index, Range::new(0, blocks.len()))
    }

    /// Find the block containing the element at global `index`,
    /// searching only from chain position `start_block_index` onward.
    ///
    /// The narrowing is a performance hint, not a filter: if the
    /// containing block sits before `start_block_index`, the call
    /// fails.
    pub fn block_info_from<T, S: BlockStore<T>>(
        &self,
        blocks: &BlockCollection<T, S>,
        index: usize,
        start_block_index: usize,
    ) -> Result<BlockInfo, BigArrayError> {
        let window = Range::new(
            start_block_index,
            blocks.len().saturating_sub(start_block_index),
        );
        self.state.lock().block_info(blocks, index, window)
    }

    /// Find the block containing the element at global `index`,
    /// searching only the chain positions in `search_range`.
    ///
    /// `search_range` must be a sub-range of the chain. The narrowing
    /// is a performance hint, not a filter: if the containing block
    /// lies outside the window, the call fails.
    pub fn block_info_in<T, S: BlockStore<T>>(
        &self,
        blocks: &BlockCollection<T, S>,
        index: usize,
        search_range: Range,
    ) -> Result<BlockInfo, BigArrayError> {
        self.state.lock().block_info(blocks, index, search_range)
    }

    /// Project the global element range `calc_range` onto the chain,
    /// one [`BlockRange`] per touched block, in chain order.
    pub fn multiblock_range<T, S: BlockStore<T>>(
        &self,
        blocks: &BlockCollection<T, S>,
        calc_range: Range,
    ) -> Result<MultiblockRange, BigArrayError> {
        self.state.lock().multiblock_range(blocks, calc_range)
    }

    /// Project a backward-walking global range onto the chain.
    ///
    /// `calc_range.index` names the last element of the range and
    /// `calc_range.count` its length walking backward. The emitted
    /// block ranges come in reverse chain order, and each `subindex`
    /// names the block-local last element of that block's
    /// contribution.
    pub fn reverse_multiblock_range<T, S: BlockStore<T>>(
        &self,
        blocks: &BlockCollection<T, S>,
        calc_range: Range,
    ) -> Result<MultiblockRange, BigArrayError> {
        self.state
            .lock()
            .reverse_multiblock_range(blocks, calc_range)
    }

    /// Report a structural mutation of the chain.
    ///
    /// `block_index` is the smallest chain position the mutation
    /// touched; everything from it onward is considered stale. Callers
    /// must report each mutation right after performing it and pass a
    /// position that is valid in the mutated chain.
    pub fn data_changed(&self, block_index: usize) {
        self.state.lock().data_changed(block_index);
    }

    /// Report a block removal at chain position `block_index`.
    ///
    /// Removing the last block leaves every surviving cached entry
    /// valid, so the stale watermark is cleared instead of lowered;
    /// any other removal is handled like [`data_changed`].
    ///
    /// [`data_changed`]: ArrayMap::data_changed
    pub fn data_changed_after_removal<T, S: BlockStore<T>>(
        &self,
        blocks: &BlockCollection<T, S>,
        block_index: usize,
    ) {
        let mut state = self.state.lock();
        if block_index >= blocks.len() {
            if state
                .first_changed_block
                .is_some_and(|first| first >= block_index)
            {
                state.first_changed_block = None;
            }
            state.cached_count = None;
            return;
        }
        state.data_changed(block_index);
    }
}

impl Debug for ArrayMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ArrayMap")
            .field("cached_blocks", &state.cached_block_count())
            .field("first_changed_block", &state.first_changed_block)
            .finish_non_exhaustive()
    }
}

impl MapState {
    /// Length of the valid cache prefix, in blocks.
    fn cached_block_count(&self) -> usize {
        match self.first_changed_block {
            None => self.blocks_info.len(),
            Some(first_changed) => first_changed,
        }
    }

    /// Number of globally addressable elements covered by the valid
    /// cache prefix.
    fn cached_element_count(&mut self, block_count: usize) -> usize {
        if let Some(memo) = self.cached_count {
            if memo.first_changed_block == self.first_changed_block {
                return memo.count;
            }
        }

        let count = match self.first_changed_block {
            None => {
                if block_count == 0 {
                    0
                } else {
                    // OK to unwrap: with no pending changes over a
                    // non-empty chain the cache covers every block, so
                    // a last entry exists.
                    let last = self.blocks_info.last().unwrap();
                    last.start_index + last.count
                }
            }
            Some(0) => 0,
            Some(first_changed) => {
                // OK to index: entries below the watermark are valid,
                // so the list is at least `first_changed` long.
                let last = &self.blocks_info[first_changed - 1];
                last.start_index + last.count
            }
        };

        self.cached_count = Some(CachedCount {
            first_changed_block: self.first_changed_block,
            count,
        });
        count
    }

    fn data_changed(&mut self, block_index: usize) {
        self.first_changed_block = Some(match self.first_changed_block {
            None => block_index,
            Some(first) => first.min(block_index),
        });
        self.cached_count = None;
    }

    fn block_info<T, S: BlockStore<T>>(
        &mut self,
        blocks: &BlockCollection<T, S>,
        index: usize,
        window: Range,
    ) -> Result<BlockInfo, BigArrayError> {
        let block_count = blocks.len();
        if window
            .index
            .checked_add(window.count)
            .is_none_or(|end| end > block_count)
        {
            return Err(BigArrayError::SearchRangeOutOfBounds {
                index: window.index,
                count: window.count,
                block_count,
            });
        }

        if index < self.cached_element_count(block_count) {
            self.interpolation_search(index, window)
        } else {
            self.linear_search(blocks, index, window)
        }
    }

    /// Search the valid cache prefix for the block containing global
    /// `index`, probing by interpolation over the prefix sums.
    ///
    /// # Preconditions
    ///
    /// `index` is below the cached element count, so the containing
    /// block has a valid cache entry.
    fn interpolation_search(
        &mut self,
        index: usize,
        window: Range,
    ) -> Result<BlockInfo, BigArrayError> {
        let cached = self.cached_block_count();
        debug_assert!(cached > 0);

        // Clamp the window to the valid prefix.
        let mut lo = window.index;
        let mut hi = match (window.index + window.count)
            .min(cached)
            .checked_sub(1)
        {
            Some(hi) if lo <= hi => hi,
            // An empty effective window cannot contain the index.
            _ => return Err(BigArrayError::ElementOutOfRange { index }),
        };

        // The narrowing hint must contain the requested index.
        let first = self.blocks_info[lo];
        let last = self.blocks_info[hi];
        if index < first.start_index
            || index >= last.start_index + last.count
        {
            return Err(BigArrayError::ElementOutOfRange { index });
        }

        while lo <= hi {
            let s = self.blocks_info[lo];
            let e = self.blocks_info[hi];
            let start_index = s.start_index;
            // The window always keeps the containing block between
            // `lo` and `hi`, so it covers at least one element.
            let end_index = e.start_index + e.count - 1;

            let probe = if index == start_index {
                s.block_index
            } else {
                let skip = (index - start_index) as f64;
                let window_blocks =
                    (e.block_index - s.block_index + 1) as f64;
                let window_elements = (end_index - start_index + 1) as f64;
                // Truncate toward zero; clamp in case floating-point
                // rounding lands one past the window.
                (lo + (skip * window_blocks / window_elements) as usize)
                    .min(hi)
            };

            let probed = self.blocks_info[probe];
            if index < probed.start_index {
                hi = probe - 1;
            } else if index >= probed.start_index + probed.count {
                lo = probe + 1;
            } else {
                return Ok(probed);
            }
        }

        unreachable!(
            "interpolation window exhausted without finding element {index}"
        );
    }

    /// Scan block lengths forward from the cache frontier, appending a
    /// fresh entry per visited block, until the block containing
    /// global `index` is found.
    ///
    /// # Preconditions
    ///
    /// `index` is at or beyond the cached element count.
    fn linear_search<T, S: BlockStore<T>>(
        &mut self,
        blocks: &BlockCollection<T, S>,
        index: usize,
        window: Range,
    ) -> Result<BlockInfo, BigArrayError> {
        if blocks.is_empty() {
            return Err(BigArrayError::ElementOutOfRange { index });
        }

        let start = self.linear_start_info(blocks);
        if start.contains(index) {
            return Ok(start);
        }

        let Some(scan_end) = (window.index + window.count).checked_sub(1)
        else {
            return Err(BigArrayError::ElementOutOfRange { index });
        };

        let mut start_index = start.start_index + start.count;
        for block_index in (start.block_index + 1)..=scan_end {
            let len = blocks[block_index].len();
            let info = BlockInfo::new(block_index, start_index, len);
            // Entry `i` always lands at list position `i`.
            debug_assert_eq!(self.blocks_info.len(), block_index);
            self.blocks_info.push(info);

            if info.contains(index) {
                self.first_changed_block =
                    if block_index + 1 == blocks.len() {
                        None
                    } else {
                        Some(block_index + 1)
                    };
                return Ok(info);
            }
            start_index += len;
        }

        Err(BigArrayError::ElementOutOfRange { index })
    }

    /// Drop the obsolete cache tail and return the entry the linear
    /// scan continues from, creating the entry for block 0 if the
    /// cache is empty.
    ///
    /// # Preconditions
    ///
    /// The chain is not empty.
    fn linear_start_info<T, S: BlockStore<T>>(
        &mut self,
        blocks: &BlockCollection<T, S>,
    ) -> BlockInfo {
        if let Some(first_changed) = self.first_changed_block {
            if first_changed < self.blocks_info.len() {
                self.blocks_info.truncate(first_changed);
            }
        }

        if self.blocks_info.is_empty() {
            let info = BlockInfo::new(0, 0, blocks[0].len());
            self.blocks_info.push(info);
            self.first_changed_block =
                if blocks.len() == 1 { None } else { Some(1) };
            info
        } else {
            // OK to unwrap: just checked non-empty.
            *self.blocks_info.last().unwrap()
        }
    }

    fn multiblock_range<T, S: BlockStore<T>>(
        &mut self,
        blocks: &BlockCollection<T, S>,
        calc_range: Range,
    ) -> Result<MultiblockRange, BigArrayError> {
        let full = Range::new(0, blocks.len());

        if calc_range.count == 0 {
            let start_block_index = if calc_range.index == 0 {
                0
            } else {
                self.block_info(blocks, calc_range.index, full)?.start_index
            };
            return Ok(MultiblockRange {
                start_block_index,
                block_count: 0,
                ranges: Vec::new(),
            });
        }

        let last_index = calc_range
            .index
            .checked_add(calc_range.count - 1)
            .ok_or(BigArrayError::RangeOutOfBounds {
                index: calc_range.index,
                count: calc_range.count,
            })?;
        let start = self.block_info(blocks, calc_range.index, full)?;
        // The end block cannot sit before the start block; skip the
        // chain positions already ruled out.
        let tail = Range::new(
            start.block_index,
            blocks.len() - start.block_index,
        );
        let end = self.block_info(blocks, last_index, tail)?;

        let mut ranges =
            Vec::with_capacity(end.block_index - start.block_index + 1);
        let mut start_index = start.start_index;
        for block_index in start.block_index..=end.block_index {
            let len = blocks[block_index].len();
            let subindex = if block_index == start.block_index {
                calc_range.index - start_index
            } else {
                0
            };
            let count = (len - subindex)
                .min(last_index + 1 - start_index - subindex);
            ranges.push(BlockRange::new(subindex, count, start_index));
            start_index += len;
        }

        Ok(MultiblockRange {
            start_block_index: start.block_index,
            block_count: ranges.len(),
            ranges,
        })
    }

    fn reverse_multiblock_range<T, S: BlockStore<T>>(
        &mut self,
        blocks: &BlockCollection<T, S>,
        calc_range: Range,
    ) -> Result<MultiblockRange, BigArrayError> {
        // The forward anchor of a range whose *last* element is
        // `calc_range.index`.
        let direct_index = if calc_range.index == 0 && calc_range.count == 0
        {
            0
        } else {
            calc_range
                .index
                .checked_add(1)
                .and_then(|end| end.checked_sub(calc_range.count))
                .ok_or(BigArrayError::RangeOutOfBounds {
                    index: calc_range.index,
                    count: calc_range.count,
                })?
        };

        let MultiblockRange {
            start_block_index,
            block_count,
            mut ranges,
        } = self.multiblock_range(
            blocks,
            Range::new(direct_index, calc_range.count),
        )?;

        ranges.reverse();
        for range in &mut ranges {
            // Point at the block-local last element of the
            // contribution; an empty contribution has none to point
            // at, so its subindex is left at the block start.
            range.subindex = (range.subindex + range.count).saturating_sub(1);
        }

        Ok(MultiblockRange {
            start_block_index: (start_block_index + block_count)
                .saturating_sub(1),
            block_count,
            ranges,
        })
    }
}
