//! RAM-backed ("volatile", session-scoped) block device. No flash erase
//! cost, but the same vtable contract: blocks still need explicit `write`,
//! `deprecate` and `zero` so the core above doesn't need to know which
//! driver it's talking to.

use super::{BlockDevice, ReadOutcome};
use crate::block::{peek_header, Block, BlockStatus, BlockType, PAGE_SIZE};
use crate::drivers::token::BLOCK_SIZE;
use crate::error::KsError;

pub struct VolatileDriver {
    blocks: Vec<Vec<u8>>,
    owners: Vec<u32>,
}

impl VolatileDriver {
    pub fn new(num_blocks: u16) -> Self {
        VolatileDriver { blocks: (0..num_blocks).map(|_| Block::erased_image()).collect(), owners: vec![0; num_blocks as usize] }
    }

    fn check(&self, blockno: u16) -> Result<usize, KsError> {
        let idx = blockno as usize;
        if idx >= self.blocks.len() {
            return Err(KsError::BadBlockType);
        }
        Ok(idx)
    }
}

impl BlockDevice for VolatileDriver {
    fn num_blocks(&self) -> u16 {
        self.blocks.len() as u16
    }

    fn read(&mut self, blockno: u16) -> Result<(ReadOutcome, Vec<u8>), KsError> {
        let idx = self.check(blockno)?;
        let page0 = &self.blocks[idx][..PAGE_SIZE];
        let (block_type, _status) = peek_header(page0);
        if matches!(block_type, BlockType::Erased | BlockType::Zeroed) {
            return Ok((ReadOutcome::Empty, page0.to_vec()));
        }
        Block::from_bytes(&self.blocks[idx])?;
        Ok((ReadOutcome::Full, self.blocks[idx].clone()))
    }

    fn write(&mut self, blockno: u16, image: &[u8]) -> Result<(), KsError> {
        let idx = self.check(blockno)?;
        if image.len() != BLOCK_SIZE {
            return Err(KsError::BadBlockType);
        }
        self.blocks[idx].copy_from_slice(image);
        Ok(())
    }

    fn deprecate(&mut self, blockno: u16) -> Result<(), KsError> {
        let idx = self.check(blockno)?;
        self.blocks[idx][1] = BlockStatus::Tombstone.to_byte();
        Ok(())
    }

    fn zero(&mut self, blockno: u16) -> Result<(), KsError> {
        let idx = self.check(blockno)?;
        self.blocks[idx][..PAGE_SIZE].fill(0);
        Ok(())
    }

    fn erase_maybe(&mut self, blockno: u16) -> Result<(), KsError> {
        let idx = self.check(blockno)?;
        self.blocks[idx] = Block::erased_image();
        Ok(())
    }

    fn set_owner(&mut self, blockno: u16, owner: u32) {
        if let Ok(idx) = self.check(blockno) {
            self.owners[idx] = owner;
        }
    }

    fn test_owner(&self, blockno: u16, owner: u32) -> bool {
        (blockno as usize) < self.owners.len() && self.owners[blockno as usize] == owner
    }

    fn copy_owner(&mut self, from: u16, to: u16) {
        if let (Ok(f), Ok(t)) = (self.check(from), self.check(to)) {
            self.owners[t] = self.owners[f];
        }
    }

    fn logout(&mut self, owner: u32) {
        for o in self.owners.iter_mut() {
            if *o == owner {
                *o = 0;
            }
        }
    }
}
