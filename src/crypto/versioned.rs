//! Versioned passphrase envelope.
//!
//! ```text
//! salt (16 bytes, salt[0] = VERSION)
//!   │
//!   ├──► PBKDF2-HMAC-SHA512(passphrase, salt, 10 000 rounds) → 256-bit key
//!   │
//!   └──► IV
//!
//! envelope = salt ∥ AES-256-CBC/PKCS7(key, IV, key hex text)
//! ```
//!
//! Every failure on the decrypt path collapses into
//! [`Error::WrongPassphrase`](crate::Error::WrongPassphrase).

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroizing;

use super::KEY_DERIVED;
use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Format version stored in the first salt byte
pub const VERSION: u8 = 0x01;

/// Salt length in bytes (doubles as the CBC IV)
pub const SALT_SIZE: usize = 16;

/// PBKDF2 iteration count
pub const PBKDF2_ROUNDS: u32 = 10_000;

const BLOCK_SIZE: usize = 16;

fn derive_key(passphrase: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<Sha512>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key[..]);
    key
}

/// Whether `bytes` has the shape of a versioned envelope
pub fn is_envelope(bytes: &[u8]) -> bool {
    bytes.len() >= SALT_SIZE + BLOCK_SIZE
        && (bytes.len() - SALT_SIZE) % BLOCK_SIZE == 0
        && bytes[0] == VERSION
}

/// Encrypt the hex text of a private key
pub fn encrypt(plaintext_hex: &str, passphrase: &str, on_progress: &dyn Fn(f64)) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt[0] = VERSION;

    let key = derive_key(passphrase, &salt);
    on_progress(KEY_DERIVED);
    let ciphertext = Aes256CbcEnc::new_from_slices(&key[..], &salt)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key or IV: {}", e)))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext_hex.as_bytes());

    let mut envelope = Vec::with_capacity(SALT_SIZE + ciphertext.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt an envelope back to the key hex text
pub fn decrypt(envelope: &[u8], passphrase: &str, on_progress: &dyn Fn(f64)) -> Result<Zeroizing<String>> {
    if !is_envelope(envelope) {
        return Err(Error::WrongPassphrase);
    }
    let (salt, ciphertext) = envelope.split_at(SALT_SIZE);

    let key = derive_key(passphrase, salt);
    on_progress(KEY_DERIVED);
    let plaintext = Aes256CbcDec::new_from_slices(&key[..], salt)
        .map_err(|_| Error::WrongPassphrase)?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::WrongPassphrase)?;

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|_| Error::WrongPassphrase)
}
