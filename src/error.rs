//! # Error Handling
//!
//! This module provides the error types for the key protection core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Encoding Errors                                                   │
//! │  │   ├── UnsupportedConversion - Base pair has no conversion           │
//! │  │   └── DecodeError           - String is no known key form           │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── WrongPassphrase       - Decryption produced no valid key      │
//! │  │   ├── UnsupportedScheme     - Scheme not offered for this currency  │
//! │  │   └── EncryptionFailed      - Cipher or KDF setup failed            │
//! │  │                                                                      │
//! │  ├── Sharing Errors                                                    │
//! │  │   ├── InvalidShareParams    - Share counts out of range             │
//! │  │   ├── InsufficientShares    - More shares are needed                │
//! │  │   ├── InconsistentShares    - Shares do not belong together         │
//! │  │   └── CorruptShares         - Reconstruction gave no valid key      │
//! │  │                                                                      │
//! │  ├── Piece Errors                                                      │
//! │  │   ├── InvariantViolation    - Mixed state or misuse (programmer)    │
//! │  │   ├── UnknownCurrency       - No plugin registered for ticker       │
//! │  │   └── InvalidPiece          - Malformed piece contents              │
//! │  │                                                                      │
//! │  ├── Batch Errors                                                      │
//! │  │   └── Cancelled             - Batch cancelled by caller             │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `WrongPassphrase` is deliberately returned for every decryption failure,
//! whether the passphrase or the ciphertext is at fault. Callers must not be
//! able to tell the two apart.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the key protection core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Encoding Errors (100-199)
    // ========================================================================

    /// No conversion exists between the two bases
    #[error("Unsupported base conversion: {from} -> {to}")]
    UnsupportedConversion {
        /// Source radix
        from: u8,
        /// Target radix
        to: u8,
    },

    /// The string matches no plain, encrypted or split form
    #[error("Unable to decode key material: {0}")]
    DecodeError(String),

    // ========================================================================
    // Crypto Errors (200-299)
    // ========================================================================

    /// Decryption ran but produced no valid key
    #[error("Incorrect passphrase")]
    WrongPassphrase,

    /// The scheme is not usable for this currency or operation
    #[error("Unsupported encryption scheme: {0}")]
    UnsupportedScheme(String),

    /// Cipher or key derivation setup failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    // ========================================================================
    // Sharing Errors (300-399)
    // ========================================================================

    /// Share count or threshold out of range
    #[error("Invalid share parameters: {0}")]
    InvalidShareParams(String),

    /// Too few shares; carries the number still needed
    #[error("Insufficient shares: {0} more required")]
    InsufficientShares(usize),

    /// Supplied shares disagree on threshold, currency or address
    #[error("Inconsistent shares: {0}")]
    InconsistentShares(String),

    /// The combined secret is not a valid key
    #[error("Shares are corrupt or do not belong together")]
    CorruptShares,

    // ========================================================================
    // Piece Errors (400-499)
    // ========================================================================

    /// Programmer error: mixed state within a piece or an operation applied
    /// in the wrong state
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// No plugin registered for the ticker
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    /// Malformed piece
    #[error("Invalid piece: {0}")]
    InvalidPiece(String),

    // ========================================================================
    // Batch Errors (500-599)
    // ========================================================================

    /// The batch was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Encoding
    /// - 200-299: Crypto
    /// - 300-399: Sharing
    /// - 400-499: Piece
    /// - 500-599: Batch
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Encoding (100-199)
            Error::UnsupportedConversion { .. } => 100,
            Error::DecodeError(_) => 101,

            // Crypto (200-299)
            Error::WrongPassphrase => 200,
            Error::UnsupportedScheme(_) => 201,
            Error::EncryptionFailed(_) => 202,

            // Sharing (300-399)
            Error::InvalidShareParams(_) => 300,
            Error::InsufficientShares(_) => 301,
            Error::InconsistentShares(_) => 302,
            Error::CorruptShares => 303,

            // Piece (400-499)
            Error::InvariantViolation(_) => 400,
            Error::UnknownCurrency(_) => 401,
            Error::InvalidPiece(_) => 402,

            // Batch (500-599)
            Error::Cancelled => 500,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
            Error::DeserializationError(_) => 902,
        }
    }

    /// Check if this error requires user action
    ///
    /// These are the conditions a user can fix by typing a different
    /// passphrase or supplying more shares.
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::WrongPassphrase | Error::InsufficientShares(_)
        )
    }

    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            Error::WrongPassphrase => {
                "The passphrase is incorrect. Check it and try again.".to_string()
            }
            Error::InsufficientShares(1) => {
                "1 more share is needed to recover the keys.".to_string()
            }
            Error::InsufficientShares(n) => {
                format!("{} more shares are needed to recover the keys.", n)
            }
            Error::InconsistentShares(_) | Error::CorruptShares => {
                "The shares could not be combined. Make sure they come from the same split."
                    .to_string()
            }
            Error::Cancelled => "The operation was cancelled.".to_string(),
            _ => "The keys could not be processed.".to_string(),
        }
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::DeserializationError(err.to_string())
        } else {
            Error::SerializationError(err.to_string())
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
