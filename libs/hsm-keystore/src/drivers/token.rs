//! Flash-backed ("token", persistent) block device.
//!
//! The hosted build simulates flash subsectors with plain `Vec<u8>` pages so
//! the keystore core above can be exercised without real hardware; a
//! `hardware` build would replace the body of each method with calls into
//! the flash controller the way `hsm_hash::hw` calls into the hash core.

use super::{BlockDevice, ReadOutcome};
use crate::block::{peek_header, Block, BlockStatus, BlockType, BODY_LEN, PAGE_SIZE};
use crate::error::KsError;

pub const BLOCK_SIZE: usize = BODY_LEN + 8;

pub struct TokenDriver {
    blocks: Vec<Vec<u8>>,
    owners: Vec<u32>,
}

impl TokenDriver {
    pub fn new(num_blocks: u16) -> Self {
        TokenDriver { blocks: (0..num_blocks).map(|_| Block::erased_image()).collect(), owners: vec![0; num_blocks as usize] }
    }

    fn check(&self, blockno: u16) -> Result<usize, KsError> {
        let idx = blockno as usize;
        if idx >= self.blocks.len() {
            return Err(KsError::BadBlockType);
        }
        Ok(idx)
    }

    fn is_all_ff(buf: &[u8]) -> bool {
        buf.iter().fold(0xFFu8, |acc, &b| acc & b) == 0xFF
    }
}

impl BlockDevice for TokenDriver {
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
        // Validate the full body now, so a bad block is caught here rather
        // than by whatever later tries to interpret garbage bytes.
        Block::from_bytes(&self.blocks[idx])?;
        Ok((ReadOutcome::Full, self.blocks[idx].clone()))
    }

    fn write(&mut self, blockno: u16, image: &[u8]) -> Result<(), KsError> {
        let idx = self.check(blockno)?;
        if image.len() != BLOCK_SIZE {
            return Err(KsError::BadBlockType);
        }
        self.erase_maybe(blockno)?;
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
        // Constant-time w.r.t. block contents: always scan every byte rather
        // than short-circuiting, to avoid a timing side channel on key
        // material length.
        if !Self::is_all_ff(&self.blocks[idx]) {
            self.blocks[idx] = Block::erased_image();
        }
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
