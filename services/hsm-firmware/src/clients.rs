//! The small in-device table mapping a host-minted client handle to its
//! current login role (spec §3, "Client/session handles"). Fixed capacity,
//! allocated once out of the static pool — no growth, per spec.md §1's
//! no-heap-growth Non-goal.

use hsm_keystore::PinSlot;

/// How many distinct client handles the device can track logins for at
/// once. Comfortably above the dispatcher pool's own task count (§4.7).
const MAX_CLIENTS: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LoginState {
    wheel: bool,
    so: bool,
    user: bool,
}

impl LoginState {
    fn any(&self) -> bool {
        self.wheel || self.so || self.user
    }

    fn get(&self, slot: PinSlot) -> bool {
        match slot {
            PinSlot::Wheel => self.wheel,
            PinSlot::So => self.so,
            PinSlot::User => self.user,
        }
    }

    fn set(&mut self, slot: PinSlot, value: bool) {
        match slot {
            PinSlot::Wheel => self.wheel = value,
            PinSlot::So => self.so = value,
            PinSlot::User => self.user = value,
        }
    }
}

struct Entry {
    client_handle: u32,
    login: LoginState,
}

/// Fixed-size open-addressed table from client handle to login state.
/// `None` slots are free.
pub struct ClientTable {
    entries: Vec<Option<Entry>>,
}

impl ClientTable {
    pub fn new() -> Self {
        let mut entries = Vec::with_capacity(MAX_CLIENTS);
        entries.resize_with(MAX_CLIENTS, || None);
        ClientTable { entries }
    }

    fn find(&self, client_handle: u32) -> Option<usize> {
        self.entries.iter().position(|e| matches!(e, Some(entry) if entry.client_handle == client_handle))
    }

    fn find_or_insert(&mut self, client_handle: u32) -> Result<usize, ()> {
        if let Some(i) = self.find(client_handle) {
            return Ok(i);
        }
        let free = self.entries.iter().position(|e| e.is_none()).ok_or(())?;
        self.entries[free] = Some(Entry { client_handle, login: LoginState::default() });
        Ok(free)
    }

    /// Record `slot` as logged in for `client_handle`, allocating a table
    /// entry for it if this is its first successful login. Fails
    /// `no-client-slots-available` if the table is full of other clients.
    pub fn mark_logged_in(&mut self, client_handle: u32, slot: PinSlot) -> Result<(), ()> {
        let i = self.find_or_insert(client_handle)?;
        self.entries[i].as_mut().unwrap().login.set(slot, true);
        Ok(())
    }

    pub fn is_logged_in(&self, client_handle: u32, slot: PinSlot) -> bool {
        self.find(client_handle).map_or(false, |i| self.entries[i].as_ref().unwrap().login.get(slot))
    }

    /// `LOGOUT`: clear this client's login state entirely, freeing its slot.
    pub fn logout(&mut self, client_handle: u32) {
        if let Some(i) = self.find(client_handle) {
            self.entries[i] = None;
        }
    }

    /// `LOGOUT_ALL`: clear every client's login state.
    pub fn logout_all(&mut self) {
        for e in &mut self.entries {
            *e = None;
        }
    }

    pub fn any_logged_in(&self, client_handle: u32) -> bool {
        self.find(client_handle).map_or(false, |i| self.entries[i].as_ref().unwrap().login.any())
    }
}

impl Default for ClientTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_tracks_per_client_per_slot() {
        let mut table = ClientTable::new();
        table.mark_logged_in(7, PinSlot::User).unwrap();
        assert!(table.is_logged_in(7, PinSlot::User));
        assert!(!table.is_logged_in(7, PinSlot::So));
        assert!(!table.is_logged_in(9, PinSlot::User));
    }

    #[test]
    fn logout_clears_only_that_client() {
        let mut table = ClientTable::new();
        table.mark_logged_in(1, PinSlot::User).unwrap();
        table.mark_logged_in(2, PinSlot::User).unwrap();
        table.logout(1);
        assert!(!table.is_logged_in(1, PinSlot::User));
        assert!(table.is_logged_in(2, PinSlot::User));
    }

    #[test]
    fn logout_all_clears_every_client() {
        let mut table = ClientTable::new();
        table.mark_logged_in(1, PinSlot::User).unwrap();
        table.mark_logged_in(2, PinSlot::So).unwrap();
        table.logout_all();
        assert!(!table.any_logged_in(1));
        assert!(!table.any_logged_in(2));
    }

    #[test]
    fn table_full_of_other_clients_fails_to_admit_a_new_one() {
        let mut table = ClientTable::new();
        for n in 0..MAX_CLIENTS as u32 {
            table.mark_logged_in(n, PinSlot::User).unwrap();
        }
        assert_eq!(table.mark_logged_in(MAX_CLIENTS as u32, PinSlot::User), Err(()));
    }
}
