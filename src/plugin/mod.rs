//! # Currency Plugins
//!
//! Per-currency behavior the core consumes but does not implement: decoding
//! native key strings, deriving public addresses and advertising which
//! encryption schemes a currency supports.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PLUGIN CAPABILITY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   PluginRegistry ("BTC" → Arc<dyn CurrencyPlugin>, "LTC" → ...)         │
//! │          │                                                              │
//! │          ▼                                                              │
//! │   ┌──────────────────────┐      decode(str)         → DecodedKey        │
//! │   │   CurrencyPlugin     │      derive_address(hex) → address           │
//! │   │   (one impl per      │      is_valid_address    → bool              │
//! │   │    currency)         │      supported schemes   → [scheme]          │
//! │   └──────────────────────┘                                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The registry is passed explicitly to whatever needs it; there is no
//! process-wide plugin list.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand::RngCore;

use crate::crypto::EncryptionScheme;
use crate::error::{Error, Result};

#[cfg(test)]
pub(crate) mod mock;

/// Result of a plugin decoding one of its native key strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    /// Private key (or plugin-native encrypted key) as hex
    pub hex: String,
    /// Wallet import form of the same key
    pub wif: String,
    /// Address, when the plugin can tell from the string alone
    pub address: Option<String>,
    /// `EncryptionScheme::None` for plain keys
    pub encryption: EncryptionScheme,
}

/// Capability interface implemented once per currency
pub trait CurrencyPlugin: Send + Sync {
    /// Ticker symbol, e.g. `"BTC"`
    fn ticker(&self) -> &str;

    /// Human-readable currency name used in text exports
    fn name(&self) -> &str;

    /// Label for the private key in text exports
    fn private_label(&self) -> &str {
        "Private Key"
    }

    /// Decode a native plain (or natively encrypted) key string
    fn decode(&self, key: &str) -> Result<DecodedKey>;

    /// Derive the public address for a plain private key given as hex
    fn derive_address(&self, hex: &str) -> Result<String>;

    /// Check an address for this currency
    fn is_valid_address(&self, address: &str) -> bool;

    /// Encryption schemes this currency can be protected with
    fn supported_encryption_schemes(&self) -> Vec<EncryptionScheme>;

    /// Fresh random private key as hex
    fn random_private_key(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Whether `scheme` appears in [`Self::supported_encryption_schemes`]
    fn supports_scheme(&self, scheme: EncryptionScheme) -> bool {
        self.supported_encryption_schemes().contains(&scheme)
    }
}

impl fmt::Debug for dyn CurrencyPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyPlugin({})", self.ticker())
    }
}

/// Plugins keyed by ticker
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn CurrencyPlugin>>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, replacing any plugin with the same ticker
    pub fn register(&mut self, plugin: Arc<dyn CurrencyPlugin>) -> &mut Self {
        let ticker = plugin.ticker().to_ascii_uppercase();
        tracing::debug!("Registering currency plugin {}", ticker);
        self.plugins.insert(ticker, plugin);
        self
    }

    /// Builder-style registration
    pub fn with(mut self, plugin: Arc<dyn CurrencyPlugin>) -> Self {
        self.register(plugin);
        self
    }

    /// Look up a plugin by ticker (case-insensitive)
    pub fn get(&self, ticker: &str) -> Result<Arc<dyn CurrencyPlugin>> {
        self.plugins
            .get(&ticker.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| Error::UnknownCurrency(ticker.to_string()))
    }

    /// Registered tickers in sorted order
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("tickers", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
