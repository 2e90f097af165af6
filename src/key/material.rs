//! Normalized key material.
//!
//! A key string is always exactly one of three things, and [`KeyState`]
//! makes that explicit:
//!
//! ```text
//! Plain                 hex = private key,          encryption = NONE
//! Encrypted(scheme)     hex = encrypted envelope,   encryption = scheme
//! Share { min_shares }  hex = share envelope,       encryption unknown
//! ```

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::EncryptionScheme;
use crate::error::{Error, Result};

/// What a piece of key material currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    /// Unencrypted private key
    Plain,
    /// Passphrase-protected key
    Encrypted(EncryptionScheme),
    /// One share of a split key
    Share {
        /// Threshold needed to recombine
        min_shares: u8,
    },
}

impl KeyState {
    /// State for a key decoded with `scheme`; `None` means plain
    pub fn from_scheme(scheme: EncryptionScheme) -> Self {
        if scheme.is_encrypting() {
            KeyState::Encrypted(scheme)
        } else {
            KeyState::Plain
        }
    }

    /// `Some(None)` for plain, `Some(scheme)` for encrypted, `None` for a
    /// share whose inner encryption is unknown
    pub fn encryption(&self) -> Option<EncryptionScheme> {
        match self {
            KeyState::Plain => Some(EncryptionScheme::None),
            KeyState::Encrypted(scheme) => Some(*scheme),
            KeyState::Share { .. } => None,
        }
    }

    /// Threshold, for shares only
    pub fn min_shares(&self) -> Option<u8> {
        match self {
            KeyState::Share { min_shares } => Some(*min_shares),
            _ => None,
        }
    }

    /// Whether the key is encrypted; unknown for shares
    pub fn is_encrypted(&self) -> Option<bool> {
        match self {
            KeyState::Plain => Some(false),
            KeyState::Encrypted(_) => Some(true),
            KeyState::Share { .. } => None,
        }
    }

    /// Whether this is a share
    pub fn is_split(&self) -> bool {
        matches!(self, KeyState::Share { .. })
    }
}

/// Hex and WIF forms of the same private string, always present together
///
/// Both strings are wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    hex: String,
    wif: String,
}

impl PrivateKey {
    /// Pair a hex string with its WIF form
    pub fn new(hex: impl Into<String>, wif: impl Into<String>) -> Self {
        Self {
            hex: hex.into(),
            wif: wif.into(),
        }
    }

    /// Hex form
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Wallet import form
    pub fn wif(&self) -> &str {
        &self.wif
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// A decoded private key string plus what is known about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    private: PrivateKey,
    state: KeyState,
    share_num: Option<u8>,
    address: Option<String>,
}

impl KeyMaterial {
    /// Assemble material from its parts
    pub fn new(private: PrivateKey, state: KeyState, address: Option<String>) -> Self {
        Self {
            private,
            state,
            share_num: None,
            address,
        }
    }

    /// Private key strings
    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    /// Current state
    pub fn state(&self) -> KeyState {
        self.state
    }

    /// 1-based position among sibling shares, if assigned
    pub fn share_num(&self) -> Option<u8> {
        self.share_num
    }

    /// Public address, if known
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Set the share number
    pub fn with_share_num(mut self, share_num: Option<u8>) -> Self {
        self.share_num = share_num;
        self
    }

    /// Attach a public address learned elsewhere.
    ///
    /// Plain material only ever carries its derived address, so the supplied
    /// one must match it. Encrypted material and shares take the address once;
    /// re-attaching the same address is a no-op, a different one is rejected.
    pub fn attach_address(&mut self, address: &str) -> Result<()> {
        match (&self.state, self.address.as_deref()) {
            (_, Some(known)) if known == address => Ok(()),
            (KeyState::Plain, _) => Err(Error::DecodeError(
                "address does not match the one derived from the private key".into(),
            )),
            (_, Some(_)) => Err(Error::DecodeError(
                "address contradicts the address already known for this key".into(),
            )),
            (_, None) => {
                self.address = Some(address.to_string());
                Ok(())
            }
        }
    }
}
