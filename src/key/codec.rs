//! Key string codec.
//!
//! ```text
//! decode(plugin, s), first success wins:
//!
//!   (a) plugin.decode(s)                          plain / plugin-native
//!       LEGACY_SIMPLE blob (Base64 or hex)        if advertised
//!       BIP38 payload (Base58Check or hex)        if advertised
//!   (b) versioned envelope (Base58 or hex)        if VERSIONED_STRONG advertised
//!   (c) share envelope (current, then legacy)
//! ```
//!
//! [`encode`] is the exact inverse for each state: decoding the WIF it
//! produces yields the same state, hex and WIF.

use super::material::{KeyMaterial, KeyState, PrivateKey};
use crate::crypto::{bip38, legacy, versioned, EncryptionScheme};
use crate::encoding::{convert, decode_hex, decode_hex_or_base58, Base};
use crate::error::{Error, Result};
use crate::plugin::CurrencyPlugin;
use crate::sharing::{self, envelope};

/// Decode any supported key string for `plugin`
pub fn decode(plugin: &dyn CurrencyPlugin, value: &str) -> Result<KeyMaterial> {
    let value = value.trim();
    if let Some(material) = decode_native(plugin, value)? {
        return Ok(material);
    }
    if let Some(material) = decode_versioned(plugin, value) {
        return Ok(material);
    }
    if let Some(material) = decode_share(value) {
        return Ok(material);
    }
    Err(Error::DecodeError(format!(
        "not a plain, encrypted or split {} key",
        plugin.ticker()
    )))
}

/// Decode a plain or encrypted key string, never a share.
///
/// Used on the output of a combine, where a share would mean the shares
/// were nested.
pub fn decode_unsplit(plugin: &dyn CurrencyPlugin, value: &str) -> Result<KeyMaterial> {
    let value = value.trim();
    if let Some(material) = decode_native(plugin, value)? {
        return Ok(material);
    }
    decode_versioned(plugin, value).ok_or_else(|| {
        Error::DecodeError(format!("not a plain or encrypted {} key", plugin.ticker()))
    })
}

/// WIF for `hex` in `state`
pub fn encode(plugin: &dyn CurrencyPlugin, hex: &str, state: KeyState) -> Result<String> {
    match state {
        KeyState::Plain | KeyState::Encrypted(EncryptionScheme::None) => {
            let decoded = plugin.decode(hex)?;
            if decoded.encryption.is_encrypting() {
                return Err(Error::DecodeError("key is not plain".into()));
            }
            Ok(decoded.wif)
        }
        _ => encode_protected(hex, state),
    }
}

/// WIF for encrypted or split material; these forms do not depend on the
/// currency
fn encode_protected(hex: &str, state: KeyState) -> Result<String> {
    match state {
        KeyState::Encrypted(EncryptionScheme::LegacySimple) => convert(Base::Hex, Base::Base64, hex),
        KeyState::Encrypted(EncryptionScheme::VersionedStrong) | KeyState::Share { .. } => {
            convert(Base::Hex, Base::Base58, hex)
        }
        KeyState::Encrypted(EncryptionScheme::Bip38) => {
            Ok(bs58::encode(decode_hex(hex)?).with_check().into_string())
        }
        KeyState::Plain | KeyState::Encrypted(EncryptionScheme::None) => Err(Error::DecodeError(
            "plain keys are encoded by their currency".into(),
        )),
    }
}

/// Material for a share string, normalized to the current envelope
pub fn decode_share(value: &str) -> Option<KeyMaterial> {
    let decoded = sharing::decode_share(value)?;
    let bytes = envelope::encode(decoded.min_shares, &decoded.share);
    protected(
        &bytes,
        KeyState::Share {
            min_shares: decoded.min_shares,
        },
    )
}

// ============================================================================
// DECODE STEPS
// ============================================================================

fn decode_native(plugin: &dyn CurrencyPlugin, value: &str) -> Result<Option<KeyMaterial>> {
    if let Ok(decoded) = plugin.decode(value) {
        let state = KeyState::from_scheme(decoded.encryption);
        let address = match state {
            KeyState::Plain => Some(plugin.derive_address(&decoded.hex)?),
            _ => decoded.address,
        };
        return Ok(Some(KeyMaterial::new(
            PrivateKey::new(decoded.hex, decoded.wif),
            state,
            address,
        )));
    }

    if plugin.supports_scheme(EncryptionScheme::LegacySimple) {
        if let Some(material) = decode_legacy(value) {
            return Ok(Some(material));
        }
    }
    if plugin.supports_scheme(EncryptionScheme::Bip38) {
        if let Some(material) = decode_bip38(value) {
            return Ok(Some(material));
        }
    }
    Ok(None)
}

fn protected(bytes: &[u8], state: KeyState) -> Option<KeyMaterial> {
    let hex = hex::encode(bytes);
    let wif = encode_protected(&hex, state).ok()?;
    Some(KeyMaterial::new(PrivateKey::new(hex, wif), state, None))
}

fn decode_legacy(value: &str) -> Option<KeyMaterial> {
    let bytes = if value.starts_with("U2FsdGVk") {
        decode_hex(&convert(Base::Base64, Base::Hex, value).ok()?).ok()?
    } else {
        hex::decode(value).ok()?
    };
    if !legacy::is_blob(&bytes) {
        return None;
    }
    protected(&bytes, KeyState::Encrypted(EncryptionScheme::LegacySimple))
}

fn decode_bip38(value: &str) -> Option<KeyMaterial> {
    let bytes = bs58::decode(value)
        .with_check(None)
        .into_vec()
        .ok()
        .or_else(|| hex::decode(value).ok())?;
    if !bip38::is_payload(&bytes) {
        return None;
    }
    protected(&bytes, KeyState::Encrypted(EncryptionScheme::Bip38))
}

fn decode_versioned(plugin: &dyn CurrencyPlugin, value: &str) -> Option<KeyMaterial> {
    if !plugin.supports_scheme(EncryptionScheme::VersionedStrong) {
        return None;
    }
    let bytes = decode_hex_or_base58(value)?;
    if !versioned::is_envelope(&bytes) {
        return None;
    }
    protected(&bytes, KeyState::Encrypted(EncryptionScheme::VersionedStrong))
}

// ============================================================================
// TESTS
// ============================================================================
