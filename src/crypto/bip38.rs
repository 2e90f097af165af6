//! BIP38 passphrase-protected keys (non-EC-multiply mode).
//!
//! ```text
//! addresshash = SHA256(SHA256(address))[0..4]
//! derived     = scrypt(passphrase, addresshash, N=16384, r=8, p=8, 64 bytes)
//! half1/half2 = derived[0..32] / derived[32..64]
//!
//! eh1 = AES256(key = half2, key[0..16]  ⊕ half1[0..16])
//! eh2 = AES256(key = half2, key[16..32] ⊕ half1[16..32])
//!
//! payload = 0x01 0x42 ∥ flag ∥ addresshash ∥ eh1 ∥ eh2   (39 bytes, base58check "6P…")
//! ```
//!
//! The address comes from the currency plugin, so any currency that derives
//! addresses can offer this scheme.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::KEY_DERIVED;
use crate::error::{Error, Result};

/// Leading bytes of a non-EC-multiplied payload
pub const PREFIX: [u8; 2] = [0x01, 0x42];

/// Flag byte for a compressed public key
pub const FLAG_COMPRESSED: u8 = 0xe0;

/// Flag byte for an uncompressed public key
pub const FLAG_UNCOMPRESSED: u8 = 0xc0;

/// Total payload length before the base58check checksum
pub const PAYLOAD_SIZE: usize = 39;

const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 8;

fn address_hash(address: &str) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(address.as_bytes()));
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

fn derive(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 64]>> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 64)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid scrypt params: {}", e)))?;
    let mut out = Zeroizing::new([0u8; 64]);
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut out[..])
        .map_err(|e| Error::EncryptionFailed(format!("scrypt failed: {}", e)))?;
    Ok(out)
}

/// Whether `bytes` is a non-EC-multiplied payload
pub fn is_payload(bytes: &[u8]) -> bool {
    bytes.len() == PAYLOAD_SIZE
        && bytes[..2] == PREFIX
        && (bytes[2] == FLAG_COMPRESSED || bytes[2] == FLAG_UNCOMPRESSED)
}

/// Encrypt a 32-byte private key bound to `address`
pub fn encrypt(key: &[u8], passphrase: &str, address: &str, on_progress: &dyn Fn(f64)) -> Result<Vec<u8>> {
    if key.len() != 32 {
        return Err(Error::EncryptionFailed(format!(
            "BIP38 needs a 32-byte key, got {} bytes",
            key.len()
        )));
    }
    let hash = address_hash(address);
    let derived = derive(passphrase, &hash)?;
    on_progress(KEY_DERIVED);
    let (half1, half2) = derived.split_at(32);
    let cipher = Aes256::new(GenericArray::from_slice(half2));

    let mut payload = Vec::with_capacity(PAYLOAD_SIZE);
    payload.extend_from_slice(&PREFIX);
    payload.push(FLAG_COMPRESSED);
    payload.extend_from_slice(&hash);
    for (chunk, mask) in key.chunks(16).zip(half1.chunks(16)) {
        let mut block = GenericArray::clone_from_slice(chunk);
        block.iter_mut().zip(mask).for_each(|(b, m)| *b ^= m);
        cipher.encrypt_block(&mut block);
        payload.extend_from_slice(&block);
    }
    Ok(payload)
}

/// Decrypt a payload to the private key bytes.
///
/// `derive_address` recomputes the address of the candidate key; a hash
/// mismatch means the passphrase was wrong.
pub fn decrypt<F>(
    payload: &[u8],
    passphrase: &str,
    derive_address: F,
    on_progress: &dyn Fn(f64),
) -> Result<Zeroizing<Vec<u8>>>
where
    F: FnOnce(&str) -> Result<String>,
{
    if !is_payload(payload) {
        return Err(Error::WrongPassphrase);
    }
    let hash = &payload[3..7];
    let derived = derive(passphrase, hash)?;
    on_progress(KEY_DERIVED);
    let (half1, half2) = derived.split_at(32);
    let cipher = Aes256::new(GenericArray::from_slice(half2));

    let mut key = Zeroizing::new(Vec::with_capacity(32));
    for (chunk, mask) in payload[7..].chunks(16).zip(half1.chunks(16)) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        block.iter_mut().zip(mask).for_each(|(b, m)| *b ^= m);
        key.extend_from_slice(&block);
    }

    let address = derive_address(&hex::encode(key.as_slice())).map_err(|_| Error::WrongPassphrase)?;
    if address_hash(&address).as_slice() != hash {
        return Err(Error::WrongPassphrase);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "0c28fca386c7a227600b2fe50b7cae11ec86d3bf1fbe471be89827e19d72aa1d";

    fn fake_address(hex: &str) -> Result<String> {
        Ok(format!("addr-{}", &hex[..16]))
    }

    #[test]
    fn test_payload_layout() {
        let key = hex::decode(KEY_HEX).unwrap();
        let payload = encrypt(&key, "TestingOneTwoThree", &fake_address(KEY_HEX).unwrap(), &|_| {}).unwrap();
        assert!(is_payload(&payload));
        let encoded = bs58::encode(&payload).with_check().into_string();
        assert!(encoded.starts_with("6P"));
    }

    #[test]
    fn test_roundtrip_and_wrong_passphrase() {
        let key = hex::decode(KEY_HEX).unwrap();
        let payload = encrypt(&key, "TestingOneTwoThree", &fake_address(KEY_HEX).unwrap(), &|_| {}).unwrap();

        let recovered = decrypt(&payload, "TestingOneTwoThree", fake_address, &|_| {}).unwrap();
        assert_eq!(hex::encode(recovered.as_slice()), KEY_HEX);

        let err = decrypt(&payload, "Satoshi", fake_address, &|_| {}).unwrap_err();
        assert_eq!(err, Error::WrongPassphrase);
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(matches!(
            encrypt(&[1u8; 16], "pw", "addr", &|_| {}),
            Err(Error::EncryptionFailed(_))
        ));
    }

    #[test]
    fn test_published_vector_compressed() {
        let key = hex::decode("CBF4B9F70470856BB4F40F80B87EDB90865997FFEE6DF315AB166D713AF433A5")
            .unwrap();
        let address = "164MQi977u9GUteHr4EPH27VkkdxmfCvGW";

        let payload = encrypt(&key, "TestingOneTwoThree", address, &|_| {}).unwrap();
        assert_eq!(
            bs58::encode(&payload).with_check().into_string(),
            "6PYNKZ1EAgYgmQfmNVamxyXVWHzK5s6DGhwP4J5o44cvXdoY7sRzhtpUeo"
        );

        let recovered = decrypt(
            &payload,
            "TestingOneTwoThree",
            |_| Ok(address.to_string()),
            &|_| {},
        )
        .unwrap();
        assert_eq!(recovered.as_slice(), key.as_slice());
    }
}
