// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod map;

use bigarray::{ArrayMap, Block, BlockCollection, FixedBalancer};

/// Chain with `default_block_size = 4` and `max_block_size = 8`,
/// seeded with `0..n`.
fn small_chain(n: u32) -> BlockCollection<u32> {
    let mut chain = BlockCollection::new();
    chain.set_default_block_size(4).unwrap();
    chain.set_max_block_size(8).unwrap();
    chain.add_elements(0..n);
    chain
}

fn map_for(chain: &BlockCollection<u32>) -> ArrayMap {
    ArrayMap::new(Box::new(FixedBalancer::new(4)), chain)
}

/// The element sequence a chain represents, in global index order.
fn flatten(chain: &BlockCollection<u32>) -> Vec<u32> {
    chain.iter().flat_map(Block::iter).copied().collect()
}
