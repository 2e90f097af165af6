//! Legacy passphrase encryption (OpenSSL "Salted__" format).
//!
//! Key and IV come from EVP_BytesToKey with MD5 over passphrase and an 8-byte
//! salt. The blob is `"Salted__" ∥ salt ∥ AES-256-CBC(key hex text)` and its
//! wallet form is Base64.
//!
//! Kept so that older exports still decrypt. New keypairs are never
//! encrypted with it.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Magic prefix of an OpenSSL salted blob
pub const MAGIC: &[u8; 8] = b"Salted__";

const SALT_SIZE: usize = 8;
const HEADER_SIZE: usize = MAGIC.len() + SALT_SIZE;
const BLOCK_SIZE: usize = 16;

/// EVP_BytesToKey(MD5, 1 round): 32-byte key followed by 16-byte IV
fn evp_bytes_to_key(passphrase: &[u8], salt: &[u8]) -> Zeroizing<[u8; 48]> {
    let mut out = Zeroizing::new([0u8; 48]);
    let mut previous: Vec<u8> = Vec::new();
    let mut filled = 0;
    while filled < out.len() {
        let mut hasher = Md5::new();
        hasher.update(&previous);
        hasher.update(passphrase);
        hasher.update(salt);
        let digest = hasher.finalize();
        let take = (out.len() - filled).min(digest.len());
        out[filled..filled + take].copy_from_slice(&digest[..take]);
        filled += take;
        previous = digest.to_vec();
    }
    out
}

/// Whether `bytes` is a salted blob
pub fn is_blob(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_SIZE + BLOCK_SIZE
        && (bytes.len() - HEADER_SIZE) % BLOCK_SIZE == 0
        && bytes.starts_with(MAGIC)
}

/// Encrypt the hex text of a private key
pub fn encrypt(plaintext_hex: &str, passphrase: &str) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let key_iv = evp_bytes_to_key(passphrase.as_bytes(), &salt);
    let ciphertext = Aes256CbcEnc::new_from_slices(&key_iv[..32], &key_iv[32..])
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key or IV: {}", e)))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext_hex.as_bytes());

    let mut blob = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a salted blob back to the key hex text
pub fn decrypt(blob: &[u8], passphrase: &str) -> Result<Zeroizing<String>> {
    if !is_blob(blob) {
        return Err(Error::WrongPassphrase);
    }
    let salt = &blob[MAGIC.len()..HEADER_SIZE];
    let key_iv = evp_bytes_to_key(passphrase.as_bytes(), salt);

    let plaintext = Aes256CbcDec::new_from_slices(&key_iv[..32], &key_iv[32..])
        .map_err(|_| Error::WrongPassphrase)?
        .decrypt_padded_vec_mut::<Pkcs7>(&blob[HEADER_SIZE..])
        .map_err(|_| Error::WrongPassphrase)?;

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|_| Error::WrongPassphrase)
}
