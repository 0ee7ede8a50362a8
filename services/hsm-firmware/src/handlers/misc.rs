//! `GET_VERSION`, `GET_RANDOM` and the PIN/login family (`SET_PIN`,
//! `LOGIN`, `LOGOUT`, `LOGOUT_ALL`, `IS_LOGGED_IN`) — the handlers that
//! don't touch a hash or pkey handle.

use hsm_keystore::PinSlot;
use hsm_rpc::{Decoder, Encoder, HalError};

use crate::context::DeviceContext;

/// Wire encoding of the `user:u32` field shared by `SET_PIN`/`LOGIN`/
/// `IS_LOGGED_IN`: which of the PIN block's three slots is addressed.
/// Not pinned by anything outside this firmware.
fn pin_slot_from_wire(code: u32) -> Result<PinSlot, HalError> {
    match code {
        0 => Ok(PinSlot::Wheel),
        1 => Ok(PinSlot::So),
        2 => Ok(PinSlot::User),
        _ => Err(HalError::BadArguments),
    }
}

pub fn get_version(_ctx: &mut DeviceContext, _client: u32, _dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    enc.encode_int(hsm_rpc::PROTOCOL_VERSION)?;
    Ok(())
}

pub fn get_random(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let length = dec.decode_int()? as usize;
    let mut buf = vec![0u8; length];
    ctx.trng().fill(&mut buf);
    enc.encode_variable_opaque(&buf)?;
    Ok(())
}

pub fn set_pin(ctx: &mut DeviceContext, _client: u32, dec: &mut Decoder<'_>, _enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let slot = pin_slot_from_wire(dec.decode_int()?)?;
    let pin = dec.decode_variable_opaque()?;
    let (token, mut trng) = ctx.token_and_trng();
    token.set_pin(&mut trng, slot, pin, hsm_keystore::DEFAULT_ITERATIONS).map_err(HalError::from)
}

pub fn login(ctx: &mut DeviceContext, client: u32, dec: &mut Decoder<'_>, _enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let slot = pin_slot_from_wire(dec.decode_int()?)?;
    let pin = dec.decode_variable_opaque()?;
    ctx.token.login(slot, pin).map_err(HalError::from)?;
    ctx.clients.mark_logged_in(client, slot).map_err(|_| HalError::NoClientSlotsAvailable)
}

pub fn logout(ctx: &mut DeviceContext, client: u32, _dec: &mut Decoder<'_>, _enc: &mut Encoder<'_>) -> Result<(), HalError> {
    ctx.clients.logout(client);
    Ok(())
}

pub fn logout_all(ctx: &mut DeviceContext, _client: u32, _dec: &mut Decoder<'_>, _enc: &mut Encoder<'_>) -> Result<(), HalError> {
    ctx.clients.logout_all();
    Ok(())
}

/// Reports logged-in state through the result code alone — `— ` in the
/// wire table (§6.2) means no output field beyond `result_code`, so the
/// caller reads success as "logged in" and *forbidden* as "not logged in".
pub fn is_logged_in(ctx: &mut DeviceContext, client: u32, dec: &mut Decoder<'_>, _enc: &mut Encoder<'_>) -> Result<(), HalError> {
    let slot = pin_slot_from_wire(dec.decode_int()?)?;
    if ctx.clients.is_logged_in(client, slot) {
        Ok(())
    } else {
        Err(HalError::Forbidden)
    }
}
