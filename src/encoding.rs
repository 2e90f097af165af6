//! # Base Encoding Utilities
//!
//! Conversion of byte strings between hex, Base58 and Base64, plus the
//! version-prefixed packing used by the share and encryption envelopes.
//!
//! ```text
//!            ┌──────────┐
//!            │  Hex 16  │
//!            └────┬─────┘
//!         ┌───────┴───────┐
//!         ▼               ▼
//!   ┌──────────┐    ┌──────────┐
//!   │ Base58   │◄··►│ Base64   │   (composed through hex)
//!   └──────────┘    └──────────┘
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{Error, Result};

/// A supported text base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base {
    /// Lowercase hexadecimal
    Hex,
    /// Bitcoin-alphabet Base58
    Base58,
    /// Standard padded Base64
    Base64,
}

impl Base {
    /// Numeric radix of this base
    pub fn radix(self) -> u8 {
        match self {
            Base::Hex => 16,
            Base::Base58 => 58,
            Base::Base64 => 64,
        }
    }

    /// Look up a base by radix
    pub fn from_radix(radix: u8) -> Option<Self> {
        match radix {
            16 => Some(Base::Hex),
            58 => Some(Base::Base58),
            64 => Some(Base::Base64),
            _ => None,
        }
    }
}

/// Convert `value` from `src` to `tgt`.
///
/// Hex↔Base58 and Hex↔Base64 are direct; Base58↔Base64 goes through hex.
/// Identity pairs are rejected like any other unsupported pair.
pub fn convert(src: Base, tgt: Base, value: &str) -> Result<String> {
    match (src, tgt) {
        (Base::Hex, Base::Base58) => Ok(bs58::encode(decode_hex(value)?).into_string()),
        (Base::Hex, Base::Base64) => Ok(STANDARD.encode(decode_hex(value)?)),
        (Base::Base58, Base::Hex) => bs58::decode(value)
            .into_vec()
            .map(hex::encode)
            .map_err(|e| Error::DecodeError(format!("Invalid base58: {}", e))),
        (Base::Base64, Base::Hex) => STANDARD
            .decode(value)
            .map(hex::encode)
            .map_err(|e| Error::DecodeError(format!("Invalid base64: {}", e))),
        (Base::Base58, Base::Base64) | (Base::Base64, Base::Base58) => {
            let hex = convert(src, Base::Hex, value)?;
            convert(Base::Hex, tgt, &hex)
        }
        _ => Err(Error::UnsupportedConversion {
            from: src.radix(),
            to: tgt.radix(),
        }),
    }
}

/// Convert between bases given as numeric radixes
pub fn to_base(src_radix: u8, tgt_radix: u8, value: &str) -> Result<String> {
    let unsupported = Error::UnsupportedConversion {
        from: src_radix,
        to: tgt_radix,
    };
    match (Base::from_radix(src_radix), Base::from_radix(tgt_radix)) {
        (Some(src), Some(tgt)) => convert(src, tgt, value),
        _ => Err(unsupported),
    }
}

/// True for a non-empty, even-length string of hex digits
pub fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.len() % 2 == 0 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Decode hex, mapping failures to [`Error::DecodeError`]
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| Error::DecodeError(format!("Invalid hex: {}", e)))
}

/// Decode a string that is either hex or Base58.
///
/// Hex is tried first; `0` is not in the Base58 alphabet so most hex strings
/// are unambiguous.
pub fn decode_hex_or_base58(value: &str) -> Option<Vec<u8>> {
    if is_hex(value) {
        return hex::decode(value).ok();
    }
    bs58::decode(value).into_vec().ok()
}

/// Prefix `payload` with a one-byte format version
pub fn pack_versioned(version: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(version);
    out.extend_from_slice(payload);
    out
}

/// Split a version-prefixed byte string into (version, payload)
pub fn unpack_versioned(bytes: &[u8]) -> Option<(u8, &[u8])> {
    bytes.split_first().map(|(version, rest)| (*version, rest))
}

// ============================================================================
// TESTS
// ============================================================================
