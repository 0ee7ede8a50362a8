//! The device's single, long-lived piece of state: the two keystores
//! (durable "token" flash and ephemeral "volatile" RAM), the bus/registry
//! pair every FPGA-backed driver binds against, the CSPRNG/MKM gates, and
//! the open-handle tables the dispatcher hands pkey/hash handles out of.
//!
//! One `DeviceContext` is constructed at boot and threaded through every
//! dispatched request for the life of the process — there is no
//! multi-tenant notion of "device" below this, matching the original
//! firmware's single hardware instance.

use hsm_bus::{Bus, Registry};
use hsm_keystore::drivers::token::TokenDriver;
use hsm_keystore::drivers::volatile::VolatileDriver;
use hsm_keystore::{KeyType, Keystore, Uuid};
use hsm_rpc::HalError;

use crate::clients::ClientTable;
use crate::handles::HandleTable;
use crate::mkm::MasterKeyMemory;
use crate::pkey::PkeyObject;
use crate::trng::CsprngTrng;

#[cfg(feature = "hosted")]
use hsm_bus::HostedBus;

/// Internal attribute type used to recover a plaintext key DER's exact
/// length on `PKEY_OPEN`, since `hsm_keywrap::unwrap_aes256` authenticates
/// the caller's claimed `expected_len` against the one sealed into the AIV
/// at wrap time — there is no way to "probe" a shorter length first. Chosen
/// from the top of the 32-bit attribute type space; a caller colliding with
/// it via `PKEY_SET_ATTRIBUTES` would only ever corrupt its own key's
/// re-open, never another key's.
const DER_LEN_ATTR: u32 = 0xFFFF_FFF0;

/// Default capacity of each open-handle table. Comfortably above the
/// dispatcher pool's task count (spec §4.7); fixed at construction, per
/// spec.md §1's no-heap-growth Non-goal.
const MAX_OPEN_HASHES: usize = 32;
const MAX_OPEN_PKEYS: usize = 32;

const TOKEN_BLOCKS: u16 = 256;
const VOLATILE_BLOCKS: u16 = 64;
const KEYSTORE_CACHE_CAPACITY: usize = 16;

pub struct DeviceContext {
    #[allow(dead_code)]
    bus: &'static dyn Bus,
    #[allow(dead_code)]
    registry: Registry,
    csprng: hsm_bus::Csprng<'static>,
    mkm: MasterKeyMemory<'static>,
    pub token: Keystore<TokenDriver>,
    pub volatile: Keystore<VolatileDriver>,
    pub clients: ClientTable,
    pub hashes: HandleTable<crate::handlers::hash::OpenHash>,
    pub pkeys: HandleTable<PkeyObject>,
}

impl DeviceContext {
    #[cfg(feature = "hosted")]
    pub fn boot_hosted() -> Result<Self, HalError> {
        let bus: &'static dyn Bus = Box::leak(Box::new(HostedBus::new()));
        Self::boot(bus)
    }

    fn boot(bus: &'static dyn Bus) -> Result<Self, HalError> {
        let registry = Registry::discover(bus).map_err(HalError::from)?;
        let mut csprng = hsm_bus::Csprng::new(bus, &registry).map_err(HalError::from)?;
        let mkm = {
            let mut trng = CsprngTrng::new(&mut csprng);
            MasterKeyMemory::new_hosted(&mut trng)
        };

        let token_driver = TokenDriver::new(TOKEN_BLOCKS);
        let volatile_driver = VolatileDriver::new(VOLATILE_BLOCKS);
        let (token, volatile) = {
            let mut trng = CsprngTrng::new(&mut csprng);
            let token = Keystore::boot(token_driver, KEYSTORE_CACHE_CAPACITY, &mut trng).map_err(HalError::from)?;
            let volatile = Keystore::boot(volatile_driver, KEYSTORE_CACHE_CAPACITY, &mut trng).map_err(HalError::from)?;
            (token, volatile)
        };

        Ok(DeviceContext {
            bus,
            registry,
            csprng,
            mkm,
            token,
            volatile,
            clients: ClientTable::new(),
            hashes: HandleTable::new(MAX_OPEN_HASHES),
            pkeys: HandleTable::new(MAX_OPEN_PKEYS),
        })
    }

    pub fn trng(&mut self) -> CsprngTrng<'_, 'static> {
        CsprngTrng::new(&mut self.csprng)
    }

    /// Split borrow of the token keystore and the TRNG, for the handful of
    /// calls (`Keystore::set_pin`, `hss::generate`/`sign`) that need both as
    /// distinct arguments in the same call — `self.trng()` alone would
    /// borrow all of `self` and conflict with `&mut self.token`.
    pub fn token_and_trng(&mut self) -> (&mut Keystore<TokenDriver>, CsprngTrng<'_, 'static>) {
        (&mut self.token, CsprngTrng::new(&mut self.csprng))
    }

    pub fn kek(&self) -> [u8; 32] {
        self.mkm.kek()
    }

    /// Persist a private key's PKCS#8/SPKI DER under `name` in the token
    /// (durable) keystore, recording its exact plaintext length as an
    /// internal attribute so it can be `fetch`ed back out later without
    /// knowing that length in advance.
    pub fn store_key_der(&mut self, owner: u32, name: Uuid, key_type: KeyType, curve: hsm_keystore::Curve, flags: u32, der: &[u8]) -> Result<(), HalError> {
        let kek = self.kek();
        let ks = &mut self.token;
        ks.store(&kek, owner, name, key_type, curve, flags, der).map_err(HalError::from)?;
        let req = hsm_keystore::AttrRequest { attr_type: DER_LEN_ATTR, value: (der.len() as u32).to_be_bytes().to_vec(), delete: false };
        ks.set_attributes(&name, &[req]).map_err(HalError::from)
    }

    /// Recover `name`'s exact plaintext DER length from the internal
    /// attribute stashed by [`Self::store_key_der`], then fetch and unwrap
    /// the key under it.
    pub fn fetch_key_der(&mut self, owner: u32, name: &Uuid) -> Result<Vec<u8>, HalError> {
        let kek = self.kek();
        let ks = &mut self.token;
        let attrs = ks.get_attributes(name, &[DER_LEN_ATTR], 4).map_err(HalError::from)?;
        let len_bytes = attrs[0].value.as_ref().ok_or(HalError::AttributeNotFound)?;
        let expected_len = u32::from_be_bytes(len_bytes.as_slice().try_into().map_err(|_| HalError::AttributeNotFound)?) as usize;
        ks.fetch(&kek, owner, name, expected_len).map_err(HalError::from)
    }

    /// `PKEY_OPEN`: look up an existing named key's cleartext metadata and
    /// reconstruct the open object from it. RSA/EC keys round-trip through
    /// [`Self::fetch_key_der`]; hashsig keys never materialize a private
    /// key in RAM at all — only the cached public key bytes, recomputed
    /// from the persisted level records.
    pub fn open_pkey_by_name(&mut self, owner: u32, name: Uuid) -> Result<PkeyObject, HalError> {
        let (key_type, curve, flags) = self.token.key_metadata(owner, &name).map_err(HalError::from)?;
        match key_type {
            KeyType::RsaPrivate | KeyType::EcPrivate => {
                let der = self.fetch_key_der(owner, &name)?;
                PkeyObject::from_private_der(key_type, curve, &der, name, owner, flags)
            }
            KeyType::RsaPublic | KeyType::EcPublic => {
                let der = self.fetch_key_der(owner, &name)?;
                PkeyObject::from_public_der(key_type, curve, &der, name, owner, flags)
            }
            KeyType::HashsigPrivate => {
                let kek = self.kek();
                let public_key = hsm_hashsig::hss::public_key(&mut self.token, &kek, owner, &name).map_err(HalError::from)?;
                Ok(PkeyObject { name, owner, flags, material: crate::pkey::KeyMaterial::HashsigPrivate { public_key } })
            }
            KeyType::HashsigLms | KeyType::HashsigLmots | KeyType::HashsigPublic => Err(HalError::UnsupportedKey),
        }
    }
}
