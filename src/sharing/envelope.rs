//! Share envelopes.
//!
//! ```text
//! current:  Base58( VERSION ∥ min_shares ∥ x ∥ y… )
//! legacy:   "<min_shares decimal>c" ∥ Base58( x ∥ y… )
//! ```
//!
//! Only the current form is ever written. The legacy form is still read so
//! older exports can be recombined.

use crate::encoding::{decode_hex_or_base58, pack_versioned, unpack_versioned};

use super::{MAX_SHARES, MIN_SHARES};

/// Current envelope version (the legacy text envelope counts as version 1)
pub const VERSION: u8 = 0x02;

/// Separator between threshold and payload in the legacy envelope
pub const LEGACY_SEPARATOR: char = 'c';

/// A share recovered from either envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedShare {
    /// Threshold recorded in the envelope
    pub min_shares: u8,
    /// Raw share: x coordinate followed by the y bytes
    pub share: Vec<u8>,
}

impl DecodedShare {
    /// Share index (the polynomial x coordinate, 1-based)
    pub fn index(&self) -> u8 {
        self.share[0]
    }
}

fn valid_threshold(min_shares: u8) -> bool {
    (MIN_SHARES..=MAX_SHARES).contains(&min_shares)
}

fn valid_share(share: &[u8]) -> bool {
    share.len() >= 2 && share[0] != 0
}

/// Envelope bytes for a share
pub fn encode(min_shares: u8, share: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(share.len() + 1);
    payload.push(min_shares);
    payload.extend_from_slice(share);
    pack_versioned(VERSION, &payload)
}

/// Base58 envelope string for a share
pub fn encode_string(min_shares: u8, share: &[u8]) -> String {
    bs58::encode(encode(min_shares, share)).into_string()
}

/// Decode a share string, current envelope first, then legacy.
///
/// Returns `None` when the string is not a share at all.
pub fn decode(value: &str) -> Option<DecodedShare> {
    decode_current(value).or_else(|| decode_legacy(value))
}

/// Decode the current envelope from hex or Base58
pub fn decode_current(value: &str) -> Option<DecodedShare> {
    let bytes = decode_hex_or_base58(value)?;
    let (version, payload) = unpack_versioned(&bytes)?;
    if version != VERSION {
        return None;
    }
    let (min_shares, share) = payload.split_first()?;
    if !valid_threshold(*min_shares) || !valid_share(share) {
        return None;
    }
    Some(DecodedShare {
        min_shares: *min_shares,
        share: share.to_vec(),
    })
}

/// Decode the legacy `"NNc" + Base58` envelope
pub fn decode_legacy(value: &str) -> Option<DecodedShare> {
    let (digits, payload) = value.split_once(LEGACY_SEPARATOR)?;
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let min_shares: u8 = digits.parse().ok()?;
    let share = bs58::decode(payload).into_vec().ok()?;
    if !valid_threshold(min_shares) || !valid_share(&share) {
        return None;
    }
    Some(DecodedShare { min_shares, share })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_roundtrip() {
        let share = vec![3u8, 0xde, 0xad, 0xbe, 0xef];
        let encoded = encode_string(4, &share);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.min_shares, 4);
        assert_eq!(decoded.share, share);
        assert_eq!(decoded.index(), 3);
    }

    #[test]
    fn test_current_accepts_hex_form() {
        let share = vec![1u8, 0x10, 0x20];
        let hex = hex::encode(encode(2, &share));
        assert_eq!(decode(&hex).unwrap().share, share);
    }

    #[test]
    fn test_legacy_envelope() {
        let share = vec![2u8, 0xaa, 0xbb, 0xcc];
        let legacy = format!("03c{}", bs58::encode(&share).into_string());
        assert_eq!(decode_current(&legacy), None);
        let decoded = decode(&legacy).unwrap();
        assert_eq!(decoded.min_shares, 3);
        assert_eq!(decoded.share, share);

        let wide = format!("12c{}", bs58::encode(&share).into_string());
        assert_eq!(decode(&wide).unwrap().min_shares, 12);
    }

    #[test]
    fn test_not_a_share() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("hello world"), None);
        // Wrong version
        let bytes = pack_versioned(0x09, &[2, 1, 5]);
        assert_eq!(decode(&bs58::encode(bytes).into_string()), None);
        // Threshold out of range
        assert_eq!(decode(&encode_string(1, &[1, 5])), None);
        assert_eq!(decode(&encode_string(128, &[1, 5])), None);
        // Zero x coordinate
        assert_eq!(decode(&encode_string(2, &[0, 5])), None);
        assert_eq!(decode("0c11"), None);
    }
}
