//! One currency's key plus its protection state.

use std::fmt;
use std::sync::Arc;

use super::codec;
use super::material::{KeyMaterial, KeyState, PrivateKey};
use crate::crypto::{self, EncryptionScheme};
use crate::error::{Error, Result};
use crate::plugin::CurrencyPlugin;
use crate::sharing;

/// A currency plugin paired with the key material it interprets
///
/// ## State Transitions
///
/// ```text
///                encrypt(scheme)
///     Plain ─────────────────────► Encrypted(scheme)
///       ▲  ◄─────────────────────      │
///       │        decrypt               │
///       │ split                  split │
///       ▼                              ▼
///     Share × N  ──combine──►  whatever was split
/// ```
///
/// The plugin is shared and never changes; the material is owned.
#[derive(Clone)]
pub struct Keypair {
    plugin: Arc<dyn CurrencyPlugin>,
    material: KeyMaterial,
}

impl Keypair {
    /// Decode `key` for `plugin`
    pub fn new(plugin: Arc<dyn CurrencyPlugin>, key: &str) -> Result<Self> {
        let material = codec::decode(plugin.as_ref(), key)?;
        Ok(Self { plugin, material })
    }

    /// Decode `key` and attach a known public address.
    ///
    /// The address must be valid for the currency. For plain keys it must
    /// also equal the derived one.
    pub fn with_address(plugin: Arc<dyn CurrencyPlugin>, key: &str, address: &str) -> Result<Self> {
        if !plugin.is_valid_address(address) {
            return Err(Error::DecodeError(format!(
                "not a valid {} address: {}",
                plugin.ticker(),
                address
            )));
        }
        let mut keypair = Self::new(plugin, key)?;
        keypair.material.attach_address(address)?;
        Ok(keypair)
    }

    /// Fresh random plain keypair
    pub fn generate(plugin: Arc<dyn CurrencyPlugin>) -> Result<Self> {
        let key = zeroize::Zeroizing::new(plugin.random_private_key());
        Self::new(plugin, &key)
    }

    /// Recombine sibling shares into the keypair they were split from.
    ///
    /// All shares must be for the same currency and carry the same address.
    /// When the address is known, the recombined key must match it.
    pub fn from_split_keypairs(shares: &[Keypair]) -> Result<Self> {
        let first = shares
            .first()
            .ok_or_else(|| Error::DecodeError("no shares supplied".into()))?;
        if shares.iter().any(|s| !s.is_split()) {
            return Err(Error::InvariantViolation(
                "only split keypairs can be combined".into(),
            ));
        }
        if shares.iter().any(|s| s.ticker() != first.ticker()) {
            return Err(Error::InconsistentShares(
                "shares are for different currencies".into(),
            ));
        }
        if shares.iter().any(|s| s.address() != first.address()) {
            return Err(Error::InconsistentShares(
                "shares carry different addresses".into(),
            ));
        }

        let plugin = Arc::clone(&first.plugin);
        let wifs: Vec<&str> = shares.iter().map(|s| s.private_wif()).collect();
        let mut material = sharing::combine(&wifs, |hex| {
            codec::decode_unsplit(plugin.as_ref(), hex).ok()
        })?;

        if let Some(address) = first.address() {
            match material.state() {
                KeyState::Plain if material.address() != Some(address) => {
                    return Err(Error::CorruptShares);
                }
                KeyState::Plain => {}
                _ => material
                    .attach_address(address)
                    .map_err(|_| Error::CorruptShares)?,
            }
        }

        tracing::debug!("Combined {} {} shares", shares.len(), plugin.ticker());
        Ok(Self { plugin, material })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// The currency plugin
    pub fn plugin(&self) -> &Arc<dyn CurrencyPlugin> {
        &self.plugin
    }

    /// Currency ticker
    pub fn ticker(&self) -> &str {
        self.plugin.ticker()
    }

    /// Public address, if known
    pub fn address(&self) -> Option<&str> {
        self.material.address()
    }

    /// Private string in hex
    pub fn private_hex(&self) -> &str {
        self.material.private().hex()
    }

    /// Private string in wallet import form
    pub fn private_wif(&self) -> &str {
        self.material.private().wif()
    }

    /// See [`KeyState::encryption`]
    pub fn encryption(&self) -> Option<EncryptionScheme> {
        self.material.state().encryption()
    }

    /// Threshold, for shares
    pub fn min_shares(&self) -> Option<u8> {
        self.material.state().min_shares()
    }

    /// Position among sibling shares
    pub fn share_num(&self) -> Option<u8> {
        self.material.share_num()
    }

    /// Whether the key is encrypted; `None` for shares
    pub fn is_encrypted(&self) -> Option<bool> {
        self.material.state().is_encrypted()
    }

    /// Whether this is one share of a split key
    pub fn is_split(&self) -> bool {
        self.material.state().is_split()
    }

    /// Underlying material
    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    pub(crate) fn set_share_num(&mut self, share_num: Option<u8>) {
        self.material = self.material.clone().with_share_num(share_num);
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    /// Encrypt a plain key in place
    pub fn encrypt(&mut self, scheme: EncryptionScheme, passphrase: &str) -> Result<()> {
        self.encrypt_with_progress(scheme, passphrase, &|_| {})
    }

    /// [`Self::encrypt`] with a progress callback
    pub fn encrypt_with_progress(
        &mut self,
        scheme: EncryptionScheme,
        passphrase: &str,
        on_progress: &dyn Fn(f64),
    ) -> Result<()> {
        if self.material.state() != KeyState::Plain {
            return Err(Error::InvariantViolation(
                "only a plain keypair can be encrypted".into(),
            ));
        }
        if matches!(scheme, EncryptionScheme::None | EncryptionScheme::LegacySimple) {
            return Err(Error::UnsupportedScheme(format!(
                "{} cannot be used for new encryption",
                scheme
            )));
        }

        let plugin = self.plugin.as_ref();
        let hex = crypto::encrypt(plugin, self.private_hex(), scheme, passphrase, on_progress)?;
        let state = KeyState::Encrypted(scheme);
        let wif = codec::encode(plugin, &hex, state)?;

        self.material = KeyMaterial::new(
            PrivateKey::new(hex, wif),
            state,
            self.material.address().map(str::to_string),
        )
        .with_share_num(self.share_num());
        Ok(())
    }

    /// Decrypt an encrypted key in place
    pub fn decrypt(&mut self, passphrase: &str) -> Result<()> {
        self.decrypt_with_progress(passphrase, &|_| {})
    }

    /// [`Self::decrypt`] with a progress callback.
    ///
    /// Plaintext that is not a valid key for the currency, or whose address
    /// differs from the known one, is reported as a wrong passphrase.
    pub fn decrypt_with_progress(&mut self, passphrase: &str, on_progress: &dyn Fn(f64)) -> Result<()> {
        let scheme = match self.material.state() {
            KeyState::Encrypted(scheme) => scheme,
            _ => {
                return Err(Error::InvariantViolation(
                    "only an encrypted keypair can be decrypted".into(),
                ))
            }
        };

        let plugin = self.plugin.as_ref();
        let hex = crypto::decrypt(plugin, self.private_hex(), scheme, passphrase, on_progress)?;
        let material = codec::decode_unsplit(plugin, &hex).map_err(|_| Error::WrongPassphrase)?;
        if material.state() != KeyState::Plain {
            return Err(Error::WrongPassphrase);
        }
        if let Some(known) = self.address() {
            if material.address() != Some(known) {
                return Err(Error::WrongPassphrase);
            }
        }

        self.material = material.with_share_num(self.share_num());
        Ok(())
    }

    /// Split into `num_shares` share keypairs, any `min_shares` of which
    /// recombine to this keypair
    pub fn split(&self, num_shares: u8, min_shares: u8) -> Result<Vec<Keypair>> {
        if self.is_split() {
            return Err(Error::InvariantViolation(
                "a split keypair cannot be split again".into(),
            ));
        }

        sharing::split(self.private_hex(), num_shares, min_shares)?
            .iter()
            .enumerate()
            .map(|(i, share)| {
                let mut material = codec::decode_share(share)
                    .ok_or_else(|| Error::Internal("split produced an unreadable share".into()))?;
                if let Some(address) = self.address() {
                    material.attach_address(address)?;
                }
                Ok(Keypair {
                    plugin: Arc::clone(&self.plugin),
                    material: material.with_share_num(Some(i as u8 + 1)),
                })
            })
            .collect()
    }
}

impl PartialEq for Keypair {
    fn eq(&self, other: &Self) -> bool {
        self.ticker() == other.ticker()
            && self.address() == other.address()
            && self.private_wif() == other.private_wif()
            && self.encryption() == other.encryption()
            && self.share_num() == other.share_num()
    }
}

impl Eq for Keypair {}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("ticker", &self.ticker())
            .field("state", &self.material.state())
            .field("address", &self.address())
            .field("share_num", &self.share_num())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
