//! Fixed-size block cache with LRU eviction.
//! Invariant: at most one slot per block number is valid at a time.

use crate::block::Block;

struct Slot {
    blockno: u16,
    lru_tick: u32,
    block: Block,
}

pub struct BlockCache {
    slots: Vec<Option<Slot>>,
    clock: u32,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        BlockCache { slots: (0..capacity).map(|_| None).collect(), clock: 0 }
    }

    fn tick(&mut self) -> u32 {
        self.clock = self.clock.wrapping_add(1);
        self.clock
    }

    pub fn get(&mut self, blockno: u16) -> Option<&Block> {
        let tick = self.tick();
        if let Some(slot) = self.slots.iter_mut().flatten().find(|s| s.blockno == blockno) {
            slot.lru_tick = tick;
            return Some(&slot.block);
        }
        None
    }

    /// Insert (or replace) the cached image for `blockno`, evicting the
    /// least-recently-used slot if the cache is full.
    pub fn insert(&mut self, blockno: u16, block: Block) {
        let tick = self.tick();
        if let Some(slot) = self.slots.iter_mut().flatten().find(|s| s.blockno == blockno) {
            slot.block = block;
            slot.lru_tick = tick;
            return;
        }
        if let Some(empty) = self.slots.iter_mut().find(|s| s.is_none()) {
            *empty = Some(Slot { blockno, lru_tick: tick, block });
            return;
        }
        let victim = self
            .slots
            .iter_mut()
            .enumerate()
            .min_by_key(|(_, s)| s.as_ref().unwrap().lru_tick)
            .map(|(i, _)| i)
            .expect("cache has at least one slot");
        self.slots[victim] = Some(Slot { blockno, lru_tick: tick, block });
    }

    pub fn invalidate(&mut self, blockno: u16) {
        if let Some(slot) = self.slots.iter_mut().find(|s| matches!(s, Some(s) if s.blockno == blockno)) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockBody, BlockStatus, BlockType, KeyBlockBody, Curve, KeyType};

    fn dummy(n: u8) -> Block {
        Block {
            block_type: BlockType::Key,
            block_status: BlockStatus::Live,
            body: BlockBody::Key(KeyBlockBody { name: [n; 16], key_type: KeyType::RsaPublic, curve: Curve::None, flags: 0, der: vec![], attrs: vec![] }),
        }
    }

    #[test]
    fn evicts_least_recently_used_when_full() {
        let mut cache = BlockCache::new(2);
        cache.insert(0, dummy(0));
        cache.insert(1, dummy(1));
        cache.get(0); // touch 0, making 1 the LRU victim
        cache.insert(2, dummy(2));
        assert!(cache.get(1).is_none());
        assert!(cache.get(0).is_some());
        assert!(cache.get(2).is_some());
    }

    #[test]
    fn invalidate_forces_a_miss() {
        let mut cache = BlockCache::new(1);
        cache.insert(5, dummy(5));
        cache.invalidate(5);
        assert!(cache.get(5).is_none());
    }
}
