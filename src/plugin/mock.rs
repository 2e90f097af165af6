//! Deterministic test currencies.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::{CurrencyPlugin, DecodedKey};
use crate::crypto::EncryptionScheme;
use crate::encoding::is_hex;
use crate::error::{Error, Result};

/// Toy currency: 32-byte keys, base58check WIF, hash-derived addresses
pub(crate) struct MockCoin {
    ticker: &'static str,
    name: &'static str,
    wif_version: Option<u8>,
    address_version: u8,
    schemes: Vec<EncryptionScheme>,
}

impl MockCoin {
    pub fn btc() -> Arc<dyn CurrencyPlugin> {
        Arc::new(Self {
            ticker: "BTC",
            name: "Bitcoin",
            wif_version: Some(0x80),
            address_version: 0x00,
            schemes: vec![
                EncryptionScheme::LegacySimple,
                EncryptionScheme::VersionedStrong,
                EncryptionScheme::Bip38,
            ],
        })
    }

    pub fn ltc() -> Arc<dyn CurrencyPlugin> {
        Arc::new(Self {
            ticker: "LTC",
            name: "Litecoin",
            wif_version: Some(0xb0),
            address_version: 0x30,
            schemes: vec![
                EncryptionScheme::LegacySimple,
                EncryptionScheme::VersionedStrong,
            ],
        })
    }

    /// Hex-only keys, no WIF
    pub fn eth() -> Arc<dyn CurrencyPlugin> {
        Arc::new(Self {
            ticker: "ETH",
            name: "Ethereum",
            wif_version: None,
            address_version: 0x41,
            schemes: vec![EncryptionScheme::VersionedStrong],
        })
    }

    fn plain(&self, bytes: &[u8]) -> DecodedKey {
        let wif = match self.wif_version {
            Some(version) => {
                let mut payload = vec![version];
                payload.extend_from_slice(bytes);
                bs58::encode(payload).with_check().into_string()
            }
            None => hex::encode(bytes),
        };
        DecodedKey {
            hex: hex::encode(bytes),
            wif,
            address: None,
            encryption: EncryptionScheme::None,
        }
    }
}

impl CurrencyPlugin for MockCoin {
    fn ticker(&self) -> &str {
        self.ticker
    }

    fn name(&self) -> &str {
        self.name
    }

    fn decode(&self, key: &str) -> Result<DecodedKey> {
        if key.len() == 64 && is_hex(key) {
            let bytes = hex::decode(key).map_err(|e| Error::DecodeError(e.to_string()))?;
            if bytes.iter().all(|b| *b == 0) {
                return Err(Error::DecodeError("zero key".into()));
            }
            return Ok(self.plain(&bytes));
        }
        if let Some(version) = self.wif_version {
            if let Ok(payload) = bs58::decode(key).with_check(Some(version)).into_vec() {
                if payload.len() == 33 {
                    return Ok(self.plain(&payload[1..]));
                }
            }
        }
        Err(Error::DecodeError(format!("not a {} key", self.ticker)))
    }

    fn derive_address(&self, hex: &str) -> Result<String> {
        let bytes = hex::decode(hex).map_err(|e| Error::DecodeError(e.to_string()))?;
        let digest = Sha256::digest(&bytes);
        let mut payload = vec![self.address_version];
        payload.extend_from_slice(&digest[..20]);
        Ok(bs58::encode(payload).with_check().into_string())
    }

    fn is_valid_address(&self, address: &str) -> bool {
        bs58::decode(address)
            .with_check(Some(self.address_version))
            .into_vec()
            .map(|payload| payload.len() == 21)
            .unwrap_or(false)
    }

    fn supported_encryption_schemes(&self) -> Vec<EncryptionScheme> {
        self.schemes.clone()
    }
}

/// Fixed 32-byte key used across tests
pub(crate) const TEST_KEY_HEX: &str =
    "0c28fca386c7a227600b2fe50b7cae11ec86d3bf1fbe471be89827e19d72aa1d";

/// Install a test subscriber once; filter with `RUST_LOG`
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coldkey_core=warn".into()),
        )
        .with_test_writer()
        .try_init();
}
