// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::{flatten, map_for, small_chain};
use anyhow::Result;
use bigarray::{BigArrayError, BlockInfo, Range};
use std::sync::Arc;
use std::thread;

#[test]
fn test_projection_reproduces_sequence() -> Result<()> {
    let chain = small_chain(23);
    let map = map_for(&chain);
    let flat = flatten(&chain);

    for (index, count) in [(0, 23), (2, 8), (5, 1), (4, 0), (19, 4), (0, 4)] {
        let mb = map.multiblock_range(&chain, Range::new(index, count))?;

        let mut collected = Vec::new();
        for (k, range) in mb.ranges.iter().enumerate() {
            let block = &chain[mb.start_block_index + k];
            let slice =
                &block.as_slice()[range.subindex..range.subindex + range.count];
            collected.extend_from_slice(slice);
        }
        assert_eq!(collected, flat[index..index + count]);
    }
    Ok(())
}

#[test]
fn test_reverse_projection_walks_backward() -> Result<()> {
    let chain = small_chain(23);
    let map = map_for(&chain);
    let flat = flatten(&chain);

    // Nine elements ending at global index 20, walked backward.
    let mb = map.reverse_multiblock_range(&chain, Range::new(20, 9))?;

    let mut collected = Vec::new();
    for (k, range) in mb.ranges.iter().enumerate() {
        let block = &chain[mb.start_block_index - k];
        for j in 0..range.count {
            collected.push(block[range.subindex - j]);
        }
    }

    let mut expected = flat[12..=20].to_vec();
    expected.reverse();
    assert_eq!(collected, expected);
    Ok(())
}

#[test]
fn test_mutation_notifications_end_to_end() -> Result<()> {
    let mut chain = small_chain(10);
    let map = map_for(&chain);

    // Warm part of the cache.
    map.block_info(&chain, 5)?;

    // Splice five elements in as blocks 1 and 2 and report the
    // mutation; the chain is now [4, 4, 1, 4, 2] blocks.
    chain.insert_block(1, (10..15).collect())?;
    map.data_changed(1);

    assert_eq!(map.block_info(&chain, 4)?, BlockInfo::new(1, 4, 4));
    assert_eq!(map.block_info(&chain, 8)?, BlockInfo::new(2, 8, 1));
    assert_eq!(map.block_info(&chain, 14)?, BlockInfo::new(4, 13, 2));

    let mb = map.multiblock_range(&chain, Range::new(6, 5))?;
    assert_eq!(mb.start_block_index, 1);
    assert_eq!(mb.block_count, 3);
    assert_eq!(mb.element_count(), 5);

    // Drop block 1 and report the removal; positions shift down.
    chain.remove_block_at(1)?;
    map.data_changed_after_removal(&chain, 1);

    assert_eq!(flatten(&chain), [0, 1, 2, 3, 14, 4, 5, 6, 7, 8, 9]);
    assert_eq!(map.block_info(&chain, 4)?, BlockInfo::new(1, 4, 1));
    assert_eq!(map.block_info(&chain, 10)?, BlockInfo::new(3, 9, 2));
    assert_eq!(
        map.block_info(&chain, 11).unwrap_err(),
        BigArrayError::ElementOutOfRange { index: 11 }
    );
    Ok(())
}

#[test]
fn test_empty_chain_gets_first_block() -> Result<()> {
    let mut chain = small_chain(0);
    let map = map_for(&chain);

    chain.ensure_first_block();
    map.data_changed(0);
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].len(), 0);

    let mb = map.multiblock_range(&chain, Range::new(0, 0))?;
    assert_eq!(mb.start_block_index, 0);
    assert_eq!(mb.block_count, 0);
    assert!(mb.ranges.is_empty());

    // The lone block is empty, so no element is addressable yet.
    assert_eq!(
        map.block_info(&chain, 0).unwrap_err(),
        BigArrayError::ElementOutOfRange { index: 0 }
    );
    Ok(())
}

#[test]
fn test_shared_map_across_threads() {
    let chain = Arc::new(small_chain(100));
    let map = Arc::new(map_for(&chain));

    let mut handles = Vec::new();
    for t in 0..4usize {
        let chain = Arc::clone(&chain);
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for index in (t..100).step_by(4) {
                let info = map.block_info(&chain, index).unwrap();
                assert!(info.contains(index));
                assert_eq!(info.block_index, index / 4);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
