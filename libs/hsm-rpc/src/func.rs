//! The closed set of RPC function codes (spec §6.2) and the current
//! protocol version constant every `GET_VERSION` reply carries.

/// The value `GET_VERSION` replies with on the wire.
pub const PROTOCOL_VERSION: u32 = 0x0101_0100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FunctionCode {
    GetVersion = 0,
    GetRandom = 1,
    SetPin = 2,
    Login = 3,
    Logout = 4,
    LogoutAll = 5,
    IsLoggedIn = 6,
    HashGetDigestLen = 7,
    HashGetDigestAlgorithmId = 8,
    HashGetAlgorithm = 9,
    HashInitialize = 10,
    HashUpdate = 11,
    HashFinalize = 12,
    PkeyLoad = 13,
    PkeyOpen = 14,
    PkeyGenerateRsa = 15,
    PkeyGenerateEc = 16,
    PkeyClose = 17,
    PkeyDelete = 18,
    PkeyGetKeyType = 19,
    PkeyGetKeyFlags = 20,
    PkeyGetPublicKeyLen = 21,
    PkeyGetPublicKey = 22,
    PkeySign = 23,
    PkeyVerify = 24,
    PkeyMatch = 25,
    PkeyGetKeyCurve = 26,
    PkeySetAttributes = 27,
    PkeyGetAttributes = 28,
    PkeyExport = 29,
    PkeyImport = 30,
    PkeyGenerateHashsig = 31,
}

impl FunctionCode {
    pub fn from_wire(code: u32) -> Option<Self> {
        use FunctionCode::*;
        let table = [
            GetVersion,
            GetRandom,
            SetPin,
            Login,
            Logout,
            LogoutAll,
            IsLoggedIn,
            HashGetDigestLen,
            HashGetDigestAlgorithmId,
            HashGetAlgorithm,
            HashInitialize,
            HashUpdate,
            HashFinalize,
            PkeyLoad,
            PkeyOpen,
            PkeyGenerateRsa,
            PkeyGenerateEc,
            PkeyClose,
            PkeyDelete,
            PkeyGetKeyType,
            PkeyGetKeyFlags,
            PkeyGetPublicKeyLen,
            PkeyGetPublicKey,
            PkeySign,
            PkeyVerify,
            PkeyMatch,
            PkeyGetKeyCurve,
            PkeySetAttributes,
            PkeyGetAttributes,
            PkeyExport,
            PkeyImport,
            PkeyGenerateHashsig,
        ];
        table.into_iter().find(|f| *f as u32 == code)
    }

    pub fn wire_code(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_code() {
        for code in 0..32u32 {
            let f = FunctionCode::from_wire(code).unwrap();
            assert_eq!(f.wire_code(), code);
        }
    }

    #[test]
    fn rejects_codes_past_the_closed_set() {
        assert!(FunctionCode::from_wire(32).is_none());
    }

    #[test]
    fn get_version_reply_constant_matches_spec() {
        assert_eq!(PROTOCOL_VERSION, 0x01010100);
    }
}
