//! In-memory index and free list over a keystore's blocks.
//!
//! `index[0..used)` is the sorted live prefix (sorted ascending by the
//! owning block's name); `index[used..N)` is the free-list suffix, order
//! significant only in that `add`/`replace` always draw from its front.

use crate::error::KsError;
use crate::uuid::{Uuid, NIL_UUID};

pub struct Index {
    index: Vec<u16>,
    names: Vec<Uuid>,
    used: usize,
}

impl Index {
    /// Build an index from a boot-time scan: `live` is the set of
    /// `(blockno, name)` pairs found with `block_status == live`, in
    /// whatever order the scan encountered them (sorted here via
    /// `heapsort`); `free_in_order` is every other block number, already
    /// ordered per the free-list priority rules.
    pub fn from_scan(num_blocks: u16, live: Vec<(u16, Uuid)>, free_in_order: Vec<u16>) -> Self {
        let n = num_blocks as usize;
        let mut names = vec![NIL_UUID; n];
        let mut index = vec![0u16; n];
        let used = live.len();
        for (i, (blockno, name)) in live.iter().enumerate() {
            index[i] = *blockno;
            names[*blockno as usize] = *name;
        }
        for (i, blockno) in free_in_order.iter().enumerate() {
            index[used + i] = *blockno;
        }
        let mut idx = Index { index, names, used };
        idx.heapsort();
        idx
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn num_blocks(&self) -> u16 {
        self.index.len() as u16
    }

    pub fn name_of(&self, blockno: u16) -> Uuid {
        self.names[blockno as usize]
    }

    /// Sort the live prefix ascending by name. Used once at initialization
    /// on a freshly built index.
    pub fn heapsort(&mut self) {
        self.index[..self.used].sort_by_key(|&b| self.names[b as usize]);
    }

    /// Assert the sorted invariant (I1); used as a debugging precondition.
    pub fn fsck(&self) -> Result<(), KsError> {
        for i in 1..self.used {
            let prev = self.names[self.index[i - 1] as usize];
            let cur = self.names[self.index[i] as usize];
            if prev >= cur {
                return Err(KsError::BadBlockType);
            }
        }
        Ok(())
    }

    fn binary_search(&self, name: &Uuid) -> Result<usize, usize> {
        self.index[..self.used].binary_search_by_key(name, |&b| self.names[b as usize])
    }

    /// Binary-search the live prefix; `hint` is tried first.
    pub fn find(&self, name: &Uuid, hint: &mut usize) -> Result<u16, KsError> {
        if *hint < self.used && self.names[self.index[*hint] as usize] == *name {
            return Ok(self.index[*hint]);
        }
        match self.binary_search(name) {
            Ok(pos) => {
                *hint = pos;
                Ok(self.index[pos])
            }
            Err(_) => Err(KsError::KeyNotFound),
        }
    }

    /// Take the first free-list block and insert it into sorted position.
    pub fn add(&mut self, name: Uuid, blockno: &mut u16, hint: &mut usize) -> Result<(), KsError> {
        if self.used == self.index.len() {
            return Err(KsError::NoSlots);
        }
        let pos = match self.binary_search(&name) {
            Ok(_) => return Err(KsError::InUse),
            Err(pos) => pos,
        };
        let fresh = self.index[self.used];
        self.index.copy_within(pos..self.used, pos + 1);
        self.index[pos] = fresh;
        self.names[fresh as usize] = name;
        self.used += 1;
        *blockno = fresh;
        *hint = pos;
        Ok(())
    }

    /// Remove `name` from the live prefix; freed block becomes the new
    /// free-list head.
    pub fn delete(&mut self, name: &Uuid, blockno: &mut u16, hint: &mut usize) -> Result<(), KsError> {
        let pos = match self.binary_search(name) {
            Ok(pos) => pos,
            Err(_) => return Err(KsError::KeyNotFound),
        };
        let freed = self.index[pos];
        self.index.copy_within(pos + 1..self.used, pos);
        self.used -= 1;
        self.index[self.used] = freed;
        *blockno = freed;
        *hint = pos.min(self.used.saturating_sub(1));
        Ok(())
    }

    /// Atomically swap the live block bound to `name` for a fresh
    /// free-list block, keeping sort order (the name doesn't change).
    pub fn replace(&mut self, name: &Uuid, blockno: &mut u16, hint: &mut usize) -> Result<(), KsError> {
        let pos = match self.binary_search(name) {
            Ok(pos) => pos,
            Err(_) => return Err(KsError::KeyNotFound),
        };
        let old = self.index[pos];
        let fresh = self.index[self.used];
        self.index[pos] = fresh;
        self.index[self.used] = old;
        self.names[fresh as usize] = name.clone();
        *blockno = fresh;
        *hint = pos;
        Ok(())
    }

    /// The block number currently at the head of the free list (used to
    /// keep it pre-erased after every update).
    pub fn free_head(&self) -> Option<u16> {
        if self.used < self.index.len() {
            Some(self.index[self.used])
        } else {
            None
        }
    }

    /// Enumerate live block numbers in sorted order, for search/match
    ///. `after` excludes names `<= after`.
    pub fn live_after<'a>(&'a self, after: &'a Uuid) -> impl Iterator<Item = (u16, Uuid)> + 'a {
        self.index[..self.used].iter().filter_map(move |&b| {
            let name = self.names[b as usize];
            if name > *after {
                Some((b, name))
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(b: u8) -> Uuid {
        let mut n = [0u8; 16];
        n[15] = b;
        n
    }

    #[test]
    fn add_keeps_sorted_order() {
        let mut idx = Index::from_scan(4, vec![], vec![0, 1, 2, 3]);
        let mut hint = 0;
        let mut b = 0;
        idx.add(name(5), &mut b, &mut hint).unwrap();
        idx.add(name(1), &mut b, &mut hint).unwrap();
        idx.add(name(9), &mut b, &mut hint).unwrap();
        idx.fsck().unwrap();
        assert_eq!(idx.used(), 3);
    }

    #[test]
    fn add_fails_when_full() {
        let mut idx = Index::from_scan(1, vec![(0, name(1))], vec![]);
        let mut hint = 0;
        let mut b = 0;
        assert_eq!(idx.add(name(2), &mut b, &mut hint), Err(KsError::NoSlots));
    }

    #[test]
    fn add_fails_on_duplicate_name() {
        let mut idx = Index::from_scan(2, vec![(0, name(1))], vec![1]);
        let mut hint = 0;
        let mut b = 0;
        assert_eq!(idx.add(name(1), &mut b, &mut hint), Err(KsError::InUse));
    }

    #[test]
    fn find_uses_hint_fast_path() {
        let idx = Index::from_scan(3, vec![(0, name(1)), (1, name(2)), (2, name(3))], vec![]);
        let mut hint = 1;
        assert_eq!(idx.find(&name(2), &mut hint).unwrap(), 1);
    }

    #[test]
    fn delete_moves_block_to_free_list_head() {
        let mut idx = Index::from_scan(2, vec![(0, name(1)), (1, name(2))], vec![]);
        let mut hint = 0;
        let mut b = 0;
        idx.delete(&name(1), &mut b, &mut hint).unwrap();
        assert_eq!(b, 0);
        assert_eq!(idx.used(), 1);
        assert_eq!(idx.free_head(), Some(0));
    }

    #[test]
    fn replace_preserves_name_binding_under_new_block() {
        let mut idx = Index::from_scan(2, vec![(0, name(1))], vec![1]);
        let mut hint = 0;
        let mut b = 0;
        idx.replace(&name(1), &mut b, &mut hint).unwrap();
        assert_eq!(b, 1);
        assert_eq!(idx.find(&name(1), &mut 0).unwrap(), 1);
        assert_eq!(idx.free_head(), Some(0));
    }
}
