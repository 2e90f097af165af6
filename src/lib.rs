//! # Coldkey Core
//!
//! Protection and fragmentation of private keys for a multi-currency
//! cold-storage generator. Keys can be encrypted under a passphrase, split
//! so that M of N shares recover them, and exported as JSON, CSV or text.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         COLDKEY CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐   ┌──────────────────┐   ┌─────────────────────────┐   │
//! │  │   Piece     │──►│    Scheduler     │──►│        Keypair          │   │
//! │  │             │   │                  │   │                         │   │
//! │  │ - Batch     │   │ - Bounded        │   │ - encrypt / decrypt     │   │
//! │  │ - Split     │   │   concurrency    │   │ - split / combine       │   │
//! │  │ - Export    │   │ - Progress       │   │ - equality              │   │
//! │  └──────┬──────┘   └──────────────────┘   └────────────┬────────────┘   │
//! │         │                                              │                │
//! │         │        ┌─────────────┐  ┌─────────────┐  ┌───┴─────────┐      │
//! │         └───────►│  Key Codec  │  │   Crypto    │  │  Sharing    │      │
//! │                  │             │  │             │  │             │      │
//! │                  │ - Decode    │  │ - Legacy    │  │ - Shamir    │      │
//! │                  │ - Encode    │  │ - Versioned │  │ - Envelope  │      │
//! │                  │             │  │ - BIP38     │  │             │      │
//! │                  └──────┬──────┘  └─────────────┘  └─────────────┘      │
//! │                         │                                               │
//! │                  ┌──────┴──────┐  ┌─────────────┐                       │
//! │                  │  Plugins    │  │  Encoding   │                       │
//! │                  │ (currency)  │  │ hex/58/64   │                       │
//! │                  └─────────────┘  └─────────────┘                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`encoding`] - Base conversion and version-prefixed packing
//! - [`plugin`] - Currency plugin capability and registry
//! - [`crypto`] - Passphrase encryption schemes
//! - [`sharing`] - Threshold secret sharing and share envelopes
//! - [`key`] - Key material, codec and keypairs
//! - [`piece`] - Batches of keypairs and their exports
//! - [`scheduler`] - Bounded, progress-reporting batch execution
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber.
//! Private keys and passphrases are never logged.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod crypto;
pub mod encoding;
pub mod error;
pub mod key;
pub mod piece;
pub mod plugin;
pub mod scheduler;
pub mod sharing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use crypto::EncryptionScheme;
pub use error::{Error, Result};
pub use key::{KeyMaterial, KeyState, Keypair};
pub use piece::{ExportOptions, Piece};
pub use plugin::{CurrencyPlugin, DecodedKey, PluginRegistry};
pub use scheduler::{BatchOp, BatchScheduler, CancelFlag};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Environment variable holding the batch concurrency bound
pub const ENV_MAX_CONCURRENCY: &str = "COLDKEY_MAX_CONCURRENCY";

/// Environment variable enabling verbose logging
pub const ENV_VERBOSE: &str = "COLDKEY_VERBOSE";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Keypairs processed at once by batch operations
    pub max_concurrency: usize,
    /// Enable verbose logging
    pub verbose_logging: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            verbose_logging: false,
        }
    }
}

impl CoreConfig {
    /// Read configuration from the environment.
    ///
    /// Missing, malformed or zero values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let max_concurrency = lookup(ENV_MAX_CONCURRENCY)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_concurrency);
        let verbose_logging = lookup(ENV_VERBOSE)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(defaults.verbose_logging);

        let config = Self {
            max_concurrency,
            verbose_logging,
        };
        tracing::debug!("Loaded configuration: {:?}", config);
        config
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Coldkey Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================
