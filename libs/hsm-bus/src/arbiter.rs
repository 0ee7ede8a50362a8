use crate::bus::Bus;
use crate::error::BusError;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use hsm_rt::{task_yield, CriticalSection};

/// Step between probed bus slots during core discovery.
pub const SLOT_STEP: u32 = 0x100;
/// Highest bus address probed during discovery (exclusive).
pub const SLOT_LIMIT: u32 = 0x10000;
/// Offset of the 8-byte NAME field within a core's slot.
const NAME_OFFSET: u32 = 0x00;
/// Offset of the 4-byte VERSION field within a core's slot.
const VERSION_OFFSET: u32 = 0x08;

/// An 8-byte, space-padded (not NUL-terminated) core name, as it appears on
/// the bus.
pub type CoreName = [u8; 8];

fn pad_name(name: &str) -> CoreName {
    let mut out = [b' '; 8];
    let bytes = name.as_bytes();
    let n = bytes.len().min(8);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Cores that occupy more than one discovery slot. Probing must skip the
/// extra, otherwise-empty-looking slots that belong to the same physical
/// core: e.g. the CSPRNG leaves 11 empty slots after it, and
/// the two ModExp variants reserve 4 and 8 total slots respectively.
const KNOWN_GAPS: &[(&str, u32)] = &[("csprng", 11), ("modexps6", 3), ("modexpa7", 7)];

fn extra_slots_for(name: &CoreName) -> u32 {
    for (known, gap) in KNOWN_GAPS {
        if *name == pad_name(known) {
            return *gap;
        }
    }
    0
}

/// Immutable facts about a core, established once at discovery and never
/// freed.
#[derive(Debug, Clone, Copy)]
pub struct CoreDescriptor {
    pub name: CoreName,
    pub version: u32,
    pub base: u32,
}

struct CoreEntry {
    desc: CoreDescriptor,
    busy: AtomicBool,
    lru: AtomicU32,
}

/// A reference to a core plus the generation token from its last
/// allocation. Re-presenting `(handle, tag)` lets the arbiter detect whether
/// the core was reassigned out from under the caller in the interim
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreHandle {
    index: usize,
}

/// The process-global table of discovered cores plus the allocator state
/// over it. Populated once by [`Registry::discover`]; entries are never
/// removed afterward.
pub struct Registry {
    entries: Vec<CoreEntry>,
    lru_clock: AtomicU32,
}

impl Registry {
    /// Scan the bus for cores. A failure to read any slot clears the table
    /// and returns [`BusError::IoUnexpected`].
    pub fn discover(bus: &dyn Bus) -> Result<Self, BusError> {
        let mut entries = Vec::new();
        let mut addr = 0u32;
        while addr < SLOT_LIMIT {
            let mut name = [0u8; 8];
            for i in 0..2 {
                let word = bus.read_word(addr, NAME_OFFSET + i * 4);
                name[(i as usize) * 4..(i as usize) * 4 + 4].copy_from_slice(&word.to_be_bytes());
            }
            if name[0] == 0x00 || name[0] == 0xFF {
                addr += SLOT_STEP;
                continue;
            }
            let version = bus.read_word(addr, VERSION_OFFSET);
            let gap = extra_slots_for(&name);
            entries.push(CoreEntry { desc: CoreDescriptor { name, version, base: addr }, busy: AtomicBool::new(false), lru: AtomicU32::new(0) });
            addr += SLOT_STEP * (1 + gap);
        }
        Ok(Registry { entries, lru_clock: AtomicU32::new(1) })
    }

    pub fn descriptor(&self, handle: CoreHandle) -> CoreDescriptor {
        self.entries[handle.index].desc
    }

    /// Bus base address of the first (only, for singleton cores such as the
    /// TRNG) core matching `name`. Used by drivers that bind a core for
    /// their whole lifetime rather than going through [`Registry::core_alloc`].
    pub fn base_of(&self, name: &str) -> Result<u32, BusError> {
        let name = pad_name(name);
        self.entries.iter().find(|e| e.desc.name == name).map(|e| e.desc.base).ok_or(BusError::CoreNotFound)
    }

    fn matches(&self, index: usize, name: &CoreName) -> bool {
        self.entries[index].desc.name == *name
    }

    /// Allocate a core by name under name-based LRU: among
    /// free matches, pick the one with the oldest `lru` counter. Blocks
    /// (cooperatively yielding) until one is free if all matches are busy.
    /// If `core` already names a handle, instead reassert exclusive access:
    /// succeed only if `tag` still matches that core's current LRU value and
    /// its name still matches.
    pub fn core_alloc(&self, name: &str, core: &mut Option<CoreHandle>, tag: &mut u32) -> Result<(), BusError> {
        let name = pad_name(name);
        if let Some(handle) = *core {
            let _cs = CriticalSection::enter();
            let entry = &self.entries[handle.index];
            if entry.desc.name != name || entry.lru.load(Ordering::Acquire) != *tag {
                return Err(BusError::CoreReassigned);
            }
            entry.busy.store(true, Ordering::Release);
            return Ok(());
        }

        loop {
            {
                let _cs = CriticalSection::enter();
                let mut best: Option<(usize, u32)> = None;
                let mut any_match = false;
                for (i, entry) in self.entries.iter().enumerate() {
                    if entry.desc.name != name {
                        continue;
                    }
                    any_match = true;
                    if entry.busy.load(Ordering::Acquire) {
                        continue;
                    }
                    let lru = entry.lru.load(Ordering::Acquire);
                    if best.map_or(true, |(_, best_lru)| lru < best_lru) {
                        best = Some((i, lru));
                    }
                }
                if !any_match {
                    return Err(BusError::CoreNotFound);
                }
                if let Some((i, _)) = best {
                    let entry = &self.entries[i];
                    entry.busy.store(true, Ordering::Release);
                    let new_lru = self.lru_clock.fetch_add(1, Ordering::AcqRel);
                    entry.lru.store(new_lru, Ordering::Release);
                    *core = Some(CoreHandle { index: i });
                    *tag = new_lru;
                    return Ok(());
                }
            }
            task_yield();
        }
    }

    /// Acquire two named cores atomically, with backoff: if the second
    /// acquisition fails after the first succeeds, release the first, yield,
    /// and retry from scratch. The caller's pre-existing `core1`/`tag1` state
    /// is preserved across retries.
    pub fn core_alloc2(
        &self,
        name1: &str,
        core1: &mut Option<CoreHandle>,
        tag1: &mut u32,
        name2: &str,
        core2: &mut Option<CoreHandle>,
        tag2: &mut u32,
    ) -> Result<(), BusError> {
        let saved_core1 = *core1;
        let saved_tag1 = *tag1;
        loop {
            *core1 = saved_core1;
            *tag1 = saved_tag1;
            self.core_alloc(name1, core1, tag1)?;
            match self.core_alloc(name2, core2, tag2) {
                Ok(()) => return Ok(()),
                Err(BusError::CoreNotFound) => {
                    if let Some(h) = core1.take() {
                        self.core_free(h);
                    }
                    return Err(BusError::CoreNotFound);
                }
                Err(_) => {
                    if let Some(h) = core1.take() {
                        self.core_free(h);
                    }
                    task_yield();
                }
            }
        }
    }

    /// Release a core back to the free pool.
    pub fn core_free(&self, core: CoreHandle) {
        self.entries[core.index].busy.store(false, Ordering::Release);
        task_yield();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::HostedBus;

    fn seed_core(bus: &HostedBus, addr: u32, name: &str, version: u32) {
        let padded = pad_name(name);
        bus.poke(addr, u32::from_be_bytes(padded[0..4].try_into().unwrap()));
        bus.poke(addr + 4, u32::from_be_bytes(padded[4..8].try_into().unwrap()));
        bus.poke(addr + VERSION_OFFSET, version);
    }

    #[test]
    fn discovers_two_identical_cores_and_cycles_lru() {
        let bus = HostedBus::new();
        seed_core(&bus, 0x000, "sha2-256", 1);
        seed_core(&bus, 0x100, "sha2-256", 1);
        let registry = Registry::discover(&bus).unwrap();
        assert_eq!(registry.entries.len(), 2);

        let mut core_a: Option<CoreHandle> = None;
        let mut tag_a = 0u32;
        registry.core_alloc("sha2-256", &mut core_a, &mut tag_a).unwrap();
        let first = core_a.unwrap();

        let mut core_b: Option<CoreHandle> = None;
        let mut tag_b = 0u32;
        registry.core_alloc("sha2-256", &mut core_b, &mut tag_b).unwrap();
        let second = core_b.unwrap();
        assert_ne!(first, second);

        registry.core_free(first);
        let mut core_c: Option<CoreHandle> = None;
        let mut tag_c = 0u32;
        registry.core_alloc("sha2-256", &mut core_c, &mut tag_c).unwrap();
        assert_eq!(core_c.unwrap(), first, "LRU must hand back the least-recently-used core");
    }

    #[test]
    fn reasserting_after_reassignment_fails() {
        let bus = HostedBus::new();
        seed_core(&bus, 0x000, "aes", 1);
        let registry = Registry::discover(&bus).unwrap();
        let mut core: Option<CoreHandle> = None;
        let mut tag = 0u32;
        registry.core_alloc("aes", &mut core, &mut tag).unwrap();
        registry.core_free(core.unwrap());

        // someone else grabs and frees it, bumping the LRU tag
        let mut other: Option<CoreHandle> = None;
        let mut other_tag = 0u32;
        registry.core_alloc("aes", &mut other, &mut other_tag).unwrap();
        registry.core_free(other.unwrap());

        assert_eq!(registry.core_alloc("aes", &mut core, &mut tag), Err(BusError::CoreReassigned));
    }

    #[test]
    fn discovery_skips_known_gap_slots() {
        let bus = HostedBus::new();
        seed_core(&bus, 0x000, "csprng", 1);
        seed_core(&bus, 0x100 * 12, "aes", 1); // right after the 11-slot gap
        let registry = Registry::discover(&bus).unwrap();
        assert_eq!(registry.entries.len(), 2);
    }
}
