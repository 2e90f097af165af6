//! # Encryption Scheme Engine
//!
//! Passphrase-based protection of private key material. Each scheme is an
//! interchangeable strategy behind one `encrypt`/`decrypt` contract.
//!
//! ## Schemes
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ENCRYPTION SCHEMES                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  LEGACY_SIMPLE      OpenSSL salted AES-256-CBC, MD5 key derivation     │
//! │                     wif: Base64 "U2FsdGVkX1..."    decode-only          │
//! │                                                                         │
//! │  VERSIONED_STRONG   PBKDF2-SHA512 (10 000) + AES-256-CBC, IV = salt    │
//! │                     wif: Base58(salt ∥ ciphertext)                      │
//! │                                                                         │
//! │  BIP38              scrypt (16384, 8, 8) + AES-256 ⊕ mask              │
//! │                     wif: Base58Check "6P..."                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cost Weights
//!
//! | Scheme | Encrypt | Decrypt |
//! |--------|---------|---------|
//! | LEGACY_SIMPLE | 10 | 100 |
//! | VERSIONED_STRONG | 540 | 540 |
//! | BIP38 | 4187 | 4581 |
//!
//! Weights are relative costs used to turn per-keypair completion into smooth
//! batch progress. Schemes with a key derivation step report
//! [`KEY_DERIVED`] once the passphrase key is ready, then `1.0` on success.
//!
//! ## Anti-oracle
//!
//! Decryption never reports why it failed. Padding errors, malformed
//! envelopes and plaintext that is not a key all come back as
//! [`Error::WrongPassphrase`].

pub mod bip38;
pub mod legacy;
pub mod versioned;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::encoding::{decode_hex, is_hex};
use crate::error::{Error, Result};
use crate::plugin::CurrencyPlugin;

/// Fraction of a keypair's work done once the passphrase key is derived
pub const KEY_DERIVED: f64 = 0.9;

/// A named passphrase-protection algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionScheme {
    /// Explicit "not encrypted" marker
    None,
    /// OpenSSL salted passphrase encryption
    LegacySimple,
    /// PBKDF2 + AES-CBC versioned envelope
    VersionedStrong,
    /// BIP38 passphrase-protected key
    #[serde(rename = "BIP38")]
    Bip38,
}

impl EncryptionScheme {
    /// Every scheme that actually encrypts
    pub const ENCRYPTING: [EncryptionScheme; 3] = [
        EncryptionScheme::LegacySimple,
        EncryptionScheme::VersionedStrong,
        EncryptionScheme::Bip38,
    ];

    /// Stable name used in JSON and CSV
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionScheme::None => "NONE",
            EncryptionScheme::LegacySimple => "LEGACY_SIMPLE",
            EncryptionScheme::VersionedStrong => "VERSIONED_STRONG",
            EncryptionScheme::Bip38 => "BIP38",
        }
    }

    /// Parse a stable name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(EncryptionScheme::None),
            "LEGACY_SIMPLE" => Some(EncryptionScheme::LegacySimple),
            "VERSIONED_STRONG" => Some(EncryptionScheme::VersionedStrong),
            "BIP38" => Some(EncryptionScheme::Bip38),
            _ => None,
        }
    }

    /// Whether this is an actual encryption (not the plain marker)
    pub fn is_encrypting(&self) -> bool {
        !matches!(self, EncryptionScheme::None)
    }

    /// Relative cost of encrypting one key
    pub fn encrypt_weight(&self) -> u64 {
        match self {
            EncryptionScheme::None => 0,
            EncryptionScheme::LegacySimple => 10,
            EncryptionScheme::VersionedStrong => 540,
            EncryptionScheme::Bip38 => 4187,
        }
    }

    /// Relative cost of decrypting one key
    pub fn decrypt_weight(&self) -> u64 {
        match self {
            EncryptionScheme::None => 0,
            EncryptionScheme::LegacySimple => 100,
            EncryptionScheme::VersionedStrong => 540,
            EncryptionScheme::Bip38 => 4581,
        }
    }
}

impl fmt::Display for EncryptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::UnsupportedScheme(s.to_string()))
    }
}

fn check_supported(plugin: &dyn CurrencyPlugin, scheme: EncryptionScheme) -> Result<()> {
    if !scheme.is_encrypting() || !plugin.supports_scheme(scheme) {
        return Err(Error::UnsupportedScheme(format!(
            "{} is not available for {}",
            scheme,
            plugin.ticker()
        )));
    }
    Ok(())
}

/// Encrypt a plain private key (hex) under `scheme`.
///
/// Returns the encrypted material as hex. `on_progress(1.0)` fires once the
/// result is ready.
pub fn encrypt(
    plugin: &dyn CurrencyPlugin,
    hex: &str,
    scheme: EncryptionScheme,
    passphrase: &str,
    on_progress: &dyn Fn(f64),
) -> Result<String> {
    check_supported(plugin, scheme)?;
    if !is_hex(hex) {
        return Err(Error::DecodeError("private key is not hex".into()));
    }

    let encrypted = match scheme {
        EncryptionScheme::LegacySimple => legacy::encrypt(hex, passphrase)?,
        EncryptionScheme::VersionedStrong => versioned::encrypt(hex, passphrase, on_progress)?,
        EncryptionScheme::Bip38 => {
            let address = plugin.derive_address(hex)?;
            let key = Zeroizing::new(decode_hex(hex)?);
            bip38::encrypt(&key, passphrase, &address, on_progress)?
        }
        EncryptionScheme::None => return Err(Error::UnsupportedScheme(scheme.to_string())),
    };

    tracing::debug!("Encrypted {} key with {}", plugin.ticker(), scheme);
    on_progress(1.0);
    Ok(hex::encode(encrypted))
}

/// Decrypt encrypted material (hex) produced under `scheme`.
///
/// The result is guaranteed to be hex text; whether it is a valid key for the
/// currency is the caller's check.
pub fn decrypt(
    plugin: &dyn CurrencyPlugin,
    encrypted_hex: &str,
    scheme: EncryptionScheme,
    passphrase: &str,
    on_progress: &dyn Fn(f64),
) -> Result<Zeroizing<String>> {
    let bytes = hex::decode(encrypted_hex).map_err(|_| Error::WrongPassphrase)?;

    let plaintext = match scheme {
        EncryptionScheme::LegacySimple => legacy::decrypt(&bytes, passphrase)?,
        EncryptionScheme::VersionedStrong => versioned::decrypt(&bytes, passphrase, on_progress)?,
        EncryptionScheme::Bip38 => {
            let key = bip38::decrypt(
                &bytes,
                passphrase,
                |hex| plugin.derive_address(hex),
                on_progress,
            )?;
            Zeroizing::new(hex::encode(key.as_slice()))
        }
        EncryptionScheme::None => return Err(Error::UnsupportedScheme(scheme.to_string())),
    };

    if !is_hex(&plaintext) {
        return Err(Error::WrongPassphrase);
    }

    tracing::debug!("Decrypted {} key with {}", plugin.ticker(), scheme);
    on_progress(1.0);
    Ok(plaintext)
}

// ============================================================================
// TESTS
// ============================================================================
