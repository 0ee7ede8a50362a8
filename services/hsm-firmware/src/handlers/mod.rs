//! Per-function decode/call/encode handlers (spec §6.2). Every function
//! code maps to one `Handler`, matched by [`crate::dispatch`] after it has
//! already consumed the wire's leading `func_code`/`client_handle` pair —
//! a handler only ever sees its own arguments (spec §6.2's "Inputs (after
//! func,client)" framing) plus `client_handle` as a plain parameter.

pub mod hash;
pub mod misc;
pub mod pkey;

use crate::context::DeviceContext;
use hsm_rpc::{Decoder, Encoder, FunctionCode, HalError};

/// A dispatch table entry: decode this function's arguments out of `dec`,
/// run it against `ctx`, and encode its reply into `enc`. `client_handle`
/// has already been decoded by the dispatcher.
pub type Handler = for<'r> fn(&mut DeviceContext, u32, &mut Decoder<'r>, &mut Encoder<'r>) -> Result<(), HalError>;

/// Maps every closed-set function code to its handler. A plain `match`
/// rather than a lookup table: `FunctionCode` has no gaps and the compiler
/// already builds a jump table for this shape.
pub fn lookup(code: FunctionCode) -> Handler {
    use FunctionCode::*;
    match code {
        GetVersion => misc::get_version,
        GetRandom => misc::get_random,
        SetPin => misc::set_pin,
        Login => misc::login,
        Logout => misc::logout,
        LogoutAll => misc::logout_all,
        IsLoggedIn => misc::is_logged_in,
        HashGetDigestLen => hash::hash_get_digest_len,
        HashGetDigestAlgorithmId => hash::hash_get_digest_algorithm_id,
        HashGetAlgorithm => hash::hash_get_algorithm,
        HashInitialize => hash::hash_initialize,
        HashUpdate => hash::hash_update_handler,
        HashFinalize => hash::hash_finalize_handler,
        PkeyLoad => pkey::pkey_load,
        PkeyOpen => pkey::pkey_open,
        PkeyGenerateRsa => pkey::pkey_generate_rsa,
        PkeyGenerateEc => pkey::pkey_generate_ec,
        PkeyClose => pkey::pkey_close,
        PkeyDelete => pkey::pkey_delete,
        PkeyGetKeyType => pkey::pkey_get_key_type,
        PkeyGetKeyFlags => pkey::pkey_get_key_flags,
        PkeyGetPublicKeyLen => pkey::pkey_get_public_key_len,
        PkeyGetPublicKey => pkey::pkey_get_public_key,
        PkeySign => pkey::pkey_sign,
        PkeyVerify => pkey::pkey_verify,
        PkeyMatch => pkey::pkey_match,
        PkeyGetKeyCurve => pkey::pkey_get_key_curve,
        PkeySetAttributes => pkey::pkey_set_attributes,
        PkeyGetAttributes => pkey::pkey_get_attributes,
        PkeyExport => pkey::pkey_export,
        PkeyImport => pkey::pkey_import,
        PkeyGenerateHashsig => pkey::pkey_generate_hashsig,
    }
}

/// Decodes `{func_code, client_handle}`, runs the matching handler, and
/// encodes its reply. Returns the error the caller should report as
/// `result_code` if the function code itself is unrecognized or a handler
/// fails; the dispatcher (`main.rs`) is responsible for writing the
/// `{func_code, client_handle, result_code}` envelope around this.
pub fn dispatch(ctx: &mut DeviceContext, dec: &mut Decoder<'_>, enc: &mut Encoder<'_>) -> Result<(FunctionCode, u32), HalError> {
    let raw_code = dec.decode_int()?;
    let client_handle = dec.decode_int()?;
    let code = FunctionCode::from_wire(raw_code).ok_or(HalError::RpcBadFunction)?;
    let handler = lookup(code);
    handler(ctx, client_handle, dec, enc)?;
    Ok((code, client_handle))
}
