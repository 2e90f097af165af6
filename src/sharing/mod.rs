//! # Secret Splitter
//!
//! Threshold secret sharing of key material: any `min_shares` of
//! `num_shares` shares reconstruct the secret, fewer reveal nothing.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SPLIT / COMBINE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  split(hex, n, m)                                                       │
//! │    hex ──► bytes ──► Shamir over GF(256), threshold m ──► n shares      │
//! │                                     │                                   │
//! │                                     ▼                                   │
//! │                      envelope(version, m, share) ──► Base58             │
//! │                                                                         │
//! │  combine(shares)                                                        │
//! │    decode every envelope (current, then legacy)                         │
//! │    thresholds differ?        ──► InconsistentShares                     │
//! │    distinct shares < m?      ──► InsufficientShares(m - count)          │
//! │    interpolate ──► hex ──► not a valid key? ──► CorruptShares           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod envelope;

use std::collections::BTreeMap;

use blahaj::{Share, Sharks};
use zeroize::Zeroizing;

use crate::encoding::decode_hex;
use crate::error::{Error, Result};

pub use envelope::DecodedShare;

/// Smallest allowed share count and threshold
pub const MIN_SHARES: u8 = 2;

/// Largest allowed share count
pub const MAX_SHARES: u8 = 127;

/// Check `num_shares ∈ [2, 127]` and `min_shares ∈ [2, num_shares]`
pub fn validate_params(num_shares: u8, min_shares: u8) -> Result<()> {
    if !(MIN_SHARES..=MAX_SHARES).contains(&num_shares) {
        return Err(Error::InvalidShareParams(format!(
            "number of shares must be between {} and {}, got {}",
            MIN_SHARES, MAX_SHARES, num_shares
        )));
    }
    if !(MIN_SHARES..=num_shares).contains(&min_shares) {
        return Err(Error::InvalidShareParams(format!(
            "minimum shares must be between {} and {}, got {}",
            MIN_SHARES, num_shares, min_shares
        )));
    }
    Ok(())
}

/// Split a hex secret into `num_shares` envelopes, any `min_shares` of which
/// reconstruct it
pub fn split(hex: &str, num_shares: u8, min_shares: u8) -> Result<Vec<String>> {
    validate_params(num_shares, min_shares)?;
    let secret = Zeroizing::new(decode_hex(hex)?);
    if secret.is_empty() {
        return Err(Error::DecodeError("cannot split an empty secret".into()));
    }

    let dealer = Sharks(min_shares).dealer(&secret);
    let shares = dealer
        .take(num_shares as usize)
        .map(|share| {
            let bytes = Zeroizing::new(Vec::from(&share));
            envelope::encode_string(min_shares, &bytes)
        })
        .collect();

    tracing::debug!("Split secret into {} shares, {} required", num_shares, min_shares);
    Ok(shares)
}

/// Decode a single share string; `None` when it is not a share
pub fn decode_share(value: &str) -> Option<DecodedShare> {
    envelope::decode(value)
}

/// Reconstruct a secret from share strings.
///
/// `finish` receives the reconstructed hex and turns it into the caller's
/// result; returning `None` means the secret is not valid for the caller and
/// surfaces as [`Error::CorruptShares`].
pub fn combine<S, T, F>(shares: &[S], finish: F) -> Result<T>
where
    S: AsRef<str>,
    F: FnOnce(&str) -> Option<T>,
{
    let decoded = shares
        .iter()
        .map(|s| {
            decode_share(s.as_ref())
                .ok_or_else(|| Error::DecodeError("not a split share".into()))
        })
        .collect::<Result<Vec<_>>>()?;

    let first = decoded
        .first()
        .ok_or_else(|| Error::DecodeError("no shares supplied".into()))?;
    let min_shares = first.min_shares;
    if decoded.iter().any(|d| d.min_shares != min_shares) {
        return Err(Error::InconsistentShares(
            "shares require different numbers of shares".into(),
        ));
    }

    let mut by_index: BTreeMap<u8, &DecodedShare> = BTreeMap::new();
    for share in &decoded {
        if let Some(existing) = by_index.insert(share.index(), share) {
            if existing.share != share.share {
                return Err(Error::InconsistentShares(format!(
                    "two different shares claim index {}",
                    share.index()
                )));
            }
        }
    }

    let count = by_index.len();
    if count < min_shares as usize {
        return Err(Error::InsufficientShares(min_shares as usize - count));
    }

    let parsed = by_index
        .values()
        .map(|d| Share::try_from(d.share.as_slice()).map_err(|_| Error::CorruptShares))
        .collect::<Result<Vec<_>>>()?;
    let secret = Zeroizing::new(
        Sharks(min_shares)
            .recover(parsed.iter())
            .map_err(|_| Error::CorruptShares)?,
    );
    let hex = Zeroizing::new(hex::encode(secret.as_slice()));

    tracing::debug!("Combined {} shares ({} required)", count, min_shares);
    finish(&hex).ok_or(Error::CorruptShares)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0c28fca386c7a227600b2fe50b7cae11ec86d3bf1fbe471be89827e19d72aa1d";

    fn recover(shares: &[&String]) -> Result<String> {
        combine(shares, |hex| Some(hex.to_string()))
    }

    /// All k-element index subsets of 0..n
    fn subsets(n: usize, k: usize) -> Vec<Vec<usize>> {
        if k == 0 {
            return vec![vec![]];
        }
        if n < k {
            return vec![];
        }
        let mut out = subsets(n - 1, k);
        for mut s in subsets(n - 1, k - 1) {
            s.push(n - 1);
            out.push(s);
        }
        out
    }

    fn pick<'a>(shares: &'a [String], idx: &[usize]) -> Vec<&'a String> {
        idx.iter().map(|i| &shares[*i]).collect()
    }

    #[test]
    fn test_five_shares_three_required() {
        let shares = split(SECRET, 5, 3).unwrap();
        assert_eq!(shares.len(), 5);

        for subset in subsets(5, 3) {
            assert_eq!(recover(&pick(&shares, &subset)).unwrap(), SECRET);
        }
        for subset in subsets(5, 2) {
            assert_eq!(
                recover(&pick(&shares, &subset)).unwrap_err(),
                Error::InsufficientShares(1)
            );
        }
        // More than the threshold also works
        assert_eq!(recover(&shares.iter().collect::<Vec<_>>()).unwrap(), SECRET);
    }

    #[test]
    fn test_threshold_grid() {
        for n in 2..=6u8 {
            for m in 2..=n {
                let shares = split(SECRET, n, m).unwrap();
                for k in 1..=n as usize {
                    for subset in subsets(n as usize, k) {
                        let result = recover(&pick(&shares, &subset));
                        if k >= m as usize {
                            assert_eq!(result.unwrap(), SECRET, "n={} m={} k={}", n, m, k);
                        } else {
                            assert_eq!(
                                result.unwrap_err(),
                                Error::InsufficientShares(m as usize - k)
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_maximum_shares() {
        let shares = split(SECRET, 127, 127).unwrap();
        assert_eq!(recover(&shares.iter().collect::<Vec<_>>()).unwrap(), SECRET);
        assert_eq!(
            recover(&shares.iter().skip(1).collect::<Vec<_>>()).unwrap_err(),
            Error::InsufficientShares(1)
        );

        let shares = split(SECRET, 127, 2).unwrap();
        assert_eq!(recover(&[&shares[10], &shares[126]]).unwrap(), SECRET);
    }

    #[test]
    fn test_envelopes_are_current_version() {
        for share in split(SECRET, 3, 2).unwrap() {
            let bytes = bs58::decode(&share).into_vec().unwrap();
            assert_eq!(bytes[0], envelope::VERSION);
            assert_eq!(bytes[1], 2);
            assert!(envelope::decode_legacy(&share).is_none());
        }
    }

    #[test]
    fn test_duplicate_shares_count_once() {
        let shares = split(SECRET, 3, 2).unwrap();
        assert_eq!(
            recover(&[&shares[0], &shares[0]]).unwrap_err(),
            Error::InsufficientShares(1)
        );
    }

    #[test]
    fn test_mismatched_thresholds() {
        let a = split(SECRET, 3, 2).unwrap();
        let b = split(SECRET, 3, 3).unwrap();
        assert!(matches!(
            recover(&[&a[0], &b[1]]).unwrap_err(),
            Error::InconsistentShares(_)
        ));
    }

    #[test]
    fn test_not_a_share() {
        let shares = split(SECRET, 3, 2).unwrap();
        let junk = "definitely not a share".to_string();
        assert!(matches!(
            recover(&[&shares[0], &junk]).unwrap_err(),
            Error::DecodeError(_)
        ));
        let empty: [&String; 0] = [];
        assert!(matches!(recover(&empty).unwrap_err(), Error::DecodeError(_)));
    }

    #[test]
    fn test_finish_rejection_is_corrupt() {
        let shares = split(SECRET, 3, 2).unwrap();
        let result: Result<()> = combine(&shares, |_| None);
        assert_eq!(result.unwrap_err(), Error::CorruptShares);
    }

    #[test]
    fn test_legacy_shares_combine() {
        let shares = split(SECRET, 3, 2).unwrap();
        let legacy: Vec<String> = shares
            .iter()
            .map(|s| {
                let decoded = decode_share(s).unwrap();
                format!("02c{}", bs58::encode(&decoded.share).into_string())
            })
            .collect();
        assert_eq!(recover(&[&legacy[0], &shares[2]]).unwrap(), SECRET);
    }

    #[test]
    fn test_invalid_params() {
        assert!(matches!(split(SECRET, 1, 1), Err(Error::InvalidShareParams(_))));
        assert!(matches!(split(SECRET, 128, 2), Err(Error::InvalidShareParams(_))));
        assert!(matches!(split(SECRET, 3, 4), Err(Error::InvalidShareParams(_))));
        assert!(matches!(split(SECRET, 3, 1), Err(Error::InvalidShareParams(_))));
        assert!(matches!(split("xyz", 3, 2), Err(Error::DecodeError(_))));
    }
}
