//! # Pieces
//!
//! A piece is the unit a user prints or exports: one or more keypairs, all in
//! the same state.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              PIECE                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Piece { piece_num: None, [BTC, BTC, LTC] }                            │
//! │        │                                                                │
//! │        │ split(4, 2): each keypair splits on its own,                   │
//! │        │              shares regroup by index                           │
//! │        ▼                                                                │
//! │   Piece #1 [BTC₁, BTC₁, LTC₁]    Piece #2 [BTC₂, BTC₂, LTC₂]   ...      │
//! │        │                               │                                │
//! │        └──────────── combine ──────────┘                                │
//! │                         │  keypair-wise recombination                   │
//! │                         ▼                                               │
//! │   Piece { piece_num: None, [BTC, BTC, LTC] }                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Every keypair in a piece reports the same `is_encrypted()` and
//! `is_split()`. A piece that breaks this is a programmer error and every
//! operation refuses it with [`Error::InvariantViolation`].
//!
//! Batch encrypt/decrypt works on a copy of the keypairs and replaces the
//! piece's keypairs only when every keypair succeeded.

mod export;

pub use export::ExportOptions;

use std::sync::Arc;

use crate::crypto::EncryptionScheme;
use crate::error::{Error, Result};
use crate::key::Keypair;
use crate::plugin::CurrencyPlugin;
use crate::scheduler::{BatchOp, BatchScheduler};
use crate::sharing::{MAX_SHARES, MIN_SHARES};

/// Largest piece number (one per possible share)
pub const MAX_PIECE_NUM: u8 = MAX_SHARES;

/// An ordered, non-empty batch of keypairs in one shared state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    keypairs: Vec<Keypair>,
    piece_num: Option<u8>,
}

impl Piece {
    /// Create a piece, checking it is non-empty and consistent
    pub fn new(keypairs: Vec<Keypair>, piece_num: Option<u8>) -> Result<Self> {
        if keypairs.is_empty() {
            return Err(Error::InvalidPiece("a piece needs at least one keypair".into()));
        }
        if let Some(num) = piece_num {
            if !(1..=MAX_PIECE_NUM).contains(&num) {
                return Err(Error::InvalidPiece(format!(
                    "piece number must be between 1 and {}, got {}",
                    MAX_PIECE_NUM, num
                )));
            }
        }
        let piece = Self { keypairs, piece_num };
        piece.check_consistency()?;
        Ok(piece)
    }

    /// Fresh plain keypairs: `count` for each plugin, in the order given
    pub fn generate(layout: &[(Arc<dyn CurrencyPlugin>, usize)]) -> Result<Self> {
        let keypairs = layout
            .iter()
            .flat_map(|(plugin, count)| std::iter::repeat(plugin).take(*count))
            .map(|plugin| Keypair::generate(Arc::clone(plugin)))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!("Generated piece of {} keypairs", keypairs.len());
        Self::new(keypairs, None)
    }

    fn check_consistency(&self) -> Result<()> {
        let first = &self.keypairs[0];
        let consistent = self.keypairs.iter().all(|kp| {
            kp.is_encrypted() == first.is_encrypted() && kp.is_split() == first.is_split()
        });
        if !consistent {
            return Err(Error::InvariantViolation(
                "keypairs in a piece must all be encrypted, plain or split alike".into(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Keypairs in order
    pub fn keypairs(&self) -> &[Keypair] {
        &self.keypairs
    }

    /// Number of keypairs
    pub fn len(&self) -> usize {
        self.keypairs.len()
    }

    /// Always false; pieces are never empty
    pub fn is_empty(&self) -> bool {
        self.keypairs.is_empty()
    }

    /// Position among sibling pieces, when this piece came from a split
    pub fn piece_num(&self) -> Option<u8> {
        self.piece_num
    }

    /// Whether the keys are encrypted; `None` for split pieces
    pub fn is_encrypted(&self) -> Option<bool> {
        self.keypairs[0].is_encrypted()
    }

    /// Whether this is one share of a split piece
    pub fn is_split(&self) -> bool {
        self.keypairs[0].is_split()
    }

    /// Pieces needed to recombine, for split pieces
    pub fn min_pieces(&self) -> Option<u8> {
        self.keypairs[0].min_shares()
    }

    // ========================================================================
    // BATCH OPERATIONS
    // ========================================================================

    /// Encrypt every keypair. `schemes` holds one scheme for all keypairs or
    /// one per keypair.
    pub async fn encrypt(
        &mut self,
        schemes: &[EncryptionScheme],
        passphrase: &str,
        scheduler: &BatchScheduler,
    ) -> Result<()> {
        self.encrypt_with_progress(schemes, passphrase, scheduler, |_| {}).await
    }

    /// [`Self::encrypt`] with a progress callback
    pub async fn encrypt_with_progress<F>(
        &mut self,
        schemes: &[EncryptionScheme],
        passphrase: &str,
        scheduler: &BatchScheduler,
        on_progress: F,
    ) -> Result<()>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.check_consistency()?;
        if self.is_encrypted() != Some(false) {
            return Err(Error::InvariantViolation(
                "only a plain, unsplit piece can be encrypted".into(),
            ));
        }
        let op = BatchOp::encrypt(schemes.to_vec(), passphrase);
        self.run_batch(op, scheduler, on_progress).await
    }

    /// Decrypt every keypair
    pub async fn decrypt(&mut self, passphrase: &str, scheduler: &BatchScheduler) -> Result<()> {
        self.decrypt_with_progress(passphrase, scheduler, |_| {}).await
    }

    /// [`Self::decrypt`] with a progress callback
    pub async fn decrypt_with_progress<F>(
        &mut self,
        passphrase: &str,
        scheduler: &BatchScheduler,
        on_progress: F,
    ) -> Result<()>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.check_consistency()?;
        if self.is_encrypted() != Some(true) {
            return Err(Error::InvariantViolation(
                "only an encrypted, unsplit piece can be decrypted".into(),
            ));
        }
        self.run_batch(BatchOp::decrypt(passphrase), scheduler, on_progress).await
    }

    async fn run_batch<F>(&mut self, op: BatchOp, scheduler: &BatchScheduler, on_progress: F) -> Result<()>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        let working = self.keypairs.clone();
        let keypairs = scheduler.run(working, op, on_progress).await?;
        let updated = Piece::new(keypairs, self.piece_num)?;
        *self = updated;
        Ok(())
    }

    // ========================================================================
    // SPLIT / COMBINE
    // ========================================================================

    /// Split into `num_pieces` sibling pieces, any `min_pieces` of which
    /// recombine to this piece
    pub fn split(&self, num_pieces: u8, min_pieces: u8) -> Result<Vec<Piece>> {
        self.check_consistency()?;
        if self.is_split() {
            return Err(Error::InvariantViolation(
                "a split piece cannot be split again".into(),
            ));
        }

        let mut groups: Vec<Vec<Keypair>> = (0..num_pieces)
            .map(|_| Vec::with_capacity(self.len()))
            .collect();
        for keypair in &self.keypairs {
            for (group, share) in groups.iter_mut().zip(keypair.split(num_pieces, min_pieces)?) {
                group.push(share);
            }
        }

        let pieces = groups
            .into_iter()
            .enumerate()
            .map(|(i, keypairs)| Piece::new(keypairs, Some(i as u8 + 1)))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(
            "Split piece of {} keypairs into {} pieces, {} required",
            self.len(),
            num_pieces,
            min_pieces
        );
        Ok(pieces)
    }

    /// Recombine sibling pieces produced by [`Self::split`]
    pub fn combine(pieces: &[Piece]) -> Result<Piece> {
        let first = pieces
            .first()
            .ok_or_else(|| Error::InvalidPiece("no pieces supplied".into()))?;
        for piece in pieces {
            piece.check_consistency()?;
            if !piece.is_split() {
                return Err(Error::InvariantViolation(
                    "only split pieces can be combined".into(),
                ));
            }
        }

        let min_pieces = first.min_pieces().unwrap_or(MIN_SHARES);
        if pieces.iter().any(|p| p.min_pieces() != Some(min_pieces)) {
            return Err(Error::InconsistentShares(
                "pieces require different numbers of pieces".into(),
            ));
        }
        if pieces.iter().any(|p| p.len() != first.len()) {
            return Err(Error::InconsistentShares(
                "pieces hold different numbers of keypairs".into(),
            ));
        }
        if pieces.len() < min_pieces as usize {
            return Err(Error::InsufficientShares(min_pieces as usize - pieces.len()));
        }

        let keypairs = (0..first.len())
            .map(|i| {
                let shares: Vec<Keypair> = pieces.iter().map(|p| p.keypairs[i].clone()).collect();
                Keypair::from_split_keypairs(&shares)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Combined {} pieces into {} keypairs", pieces.len(), keypairs.len());
        Piece::new(keypairs, None)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::mock::{init_tracing, MockCoin, TEST_KEY_HEX};

    fn sample() -> Piece {
        Piece::generate(&[(MockCoin::btc(), 2), (MockCoin::ltc(), 1)]).unwrap()
    }

    /// Indices of all pairs from 0..n
    fn pairs(n: usize) -> Vec<(usize, usize)> {
        (0..n).flat_map(|a| (a + 1..n).map(move |b| (a, b))).collect()
    }

    #[test]
    fn test_new_validation() {
        assert!(matches!(Piece::new(vec![], None), Err(Error::InvalidPiece(_))));
        let kp = Keypair::new(MockCoin::btc(), TEST_KEY_HEX).unwrap();
        assert!(matches!(
            Piece::new(vec![kp.clone()], Some(0)),
            Err(Error::InvalidPiece(_))
        ));
        assert!(matches!(
            Piece::new(vec![kp.clone()], Some(128)),
            Err(Error::InvalidPiece(_))
        ));
        assert_eq!(Piece::new(vec![kp], Some(127)).unwrap().piece_num(), Some(127));
    }

    #[test]
    fn test_mixed_state_is_invariant_violation() {
        let plain = Keypair::new(MockCoin::btc(), TEST_KEY_HEX).unwrap();
        let mut encrypted = plain.clone();
        encrypted.encrypt(EncryptionScheme::VersionedStrong, "pw").unwrap();
        assert!(matches!(
            Piece::new(vec![plain.clone(), encrypted], None),
            Err(Error::InvariantViolation(_))
        ));

        let share = plain.split(2, 2).unwrap().remove(0);
        assert!(matches!(
            Piece::new(vec![plain, share], None),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_generate() {
        let piece = sample();
        assert_eq!(piece.len(), 3);
        let tickers: Vec<&str> = piece.keypairs().iter().map(|k| k.ticker()).collect();
        assert_eq!(tickers, vec!["BTC", "BTC", "LTC"]);
        assert_eq!(piece.is_encrypted(), Some(false));
        assert!(!piece.is_split());
        assert_eq!(piece.piece_num(), None);
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_mixed_schemes() {
        init_tracing();
        let original = sample();
        let mut piece = original.clone();
        let scheduler = BatchScheduler::default();
        let schemes = [
            EncryptionScheme::Bip38,
            EncryptionScheme::VersionedStrong,
            EncryptionScheme::VersionedStrong,
        ];

        piece.encrypt(&schemes, "correct horse", &scheduler).await.unwrap();
        assert_eq!(piece.is_encrypted(), Some(true));
        assert_ne!(piece, original);

        piece.decrypt("correct horse", &scheduler).await.unwrap();
        assert_eq!(piece, original);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_piece_untouched() {
        let mut piece = sample();
        let scheduler = BatchScheduler::new(2);
        piece
            .encrypt(&[EncryptionScheme::VersionedStrong], "right", &scheduler)
            .await
            .unwrap();
        let encrypted = piece.clone();

        let err = piece.decrypt("wrong", &scheduler).await.unwrap_err();
        assert_eq!(err, Error::WrongPassphrase);
        assert_eq!(piece, encrypted);

        // LTC does not offer BIP38
        let mut plain = sample();
        let before = plain.clone();
        let err = plain
            .encrypt(&[EncryptionScheme::Bip38], "pw", &scheduler)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(_)));
        assert_eq!(plain, before);
    }

    #[tokio::test]
    async fn test_state_preconditions() {
        let scheduler = BatchScheduler::default();
        let mut piece = sample();
        assert!(matches!(
            piece.decrypt("pw", &scheduler).await,
            Err(Error::InvariantViolation(_))
        ));

        let mut share = piece.split(2, 2).unwrap().remove(0);
        assert!(matches!(
            share.encrypt(&[EncryptionScheme::VersionedStrong], "pw", &scheduler).await,
            Err(Error::InvariantViolation(_))
        ));

        piece
            .encrypt(&[EncryptionScheme::VersionedStrong], "pw", &scheduler)
            .await
            .unwrap();
        assert!(matches!(
            piece.encrypt(&[EncryptionScheme::VersionedStrong], "pw", &scheduler).await,
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_split_four_of_two_reproduces_json() {
        let original = Piece::new(
            vec![
                Keypair::new(MockCoin::btc(), TEST_KEY_HEX).unwrap(),
                Keypair::generate(MockCoin::btc()).unwrap(),
                Keypair::generate(MockCoin::ltc()).unwrap(),
            ],
            None,
        )
        .unwrap();
        let json = original.to_json().unwrap();

        let pieces = original.split(4, 2).unwrap();
        assert_eq!(pieces.len(), 4);
        for (i, piece) in pieces.iter().enumerate() {
            assert_eq!(piece.piece_num(), Some(i as u8 + 1));
            assert!(piece.is_split());
            assert_eq!(piece.min_pieces(), Some(2));
            assert!(piece.keypairs().iter().all(|k| k.share_num() == Some(i as u8 + 1)));
        }

        for (a, b) in pairs(4) {
            let combined = Piece::combine(&[pieces[a].clone(), pieces[b].clone()]).unwrap();
            assert_eq!(combined.to_json().unwrap(), json);
            assert_eq!(combined, original);
        }
        assert_eq!(
            Piece::combine(&pieces[..1]).unwrap_err(),
            Error::InsufficientShares(1)
        );
    }

    #[tokio::test]
    async fn test_split_encrypted_piece() {
        let scheduler = BatchScheduler::default();
        let mut original = sample();
        original
            .encrypt(&[EncryptionScheme::VersionedStrong], "pw", &scheduler)
            .await
            .unwrap();

        let pieces = original.split(3, 3).unwrap();
        assert_eq!(pieces[0].is_encrypted(), None);
        let combined = Piece::combine(&pieces).unwrap();
        assert_eq!(combined, original);
        assert_eq!(
            Piece::combine(&pieces[1..]).unwrap_err(),
            Error::InsufficientShares(1)
        );
    }

    #[test]
    fn test_combine_rejects_mismatched_pieces() {
        let a = sample().split(3, 2).unwrap();
        let b = sample().split(3, 3).unwrap();
        assert!(matches!(
            Piece::combine(&[a[0].clone(), b[1].clone()]),
            Err(Error::InconsistentShares(_))
        ));

        let single = Piece::generate(&[(MockCoin::btc(), 1)]).unwrap().split(3, 2).unwrap();
        assert!(matches!(
            Piece::combine(&[a[0].clone(), single[1].clone()]),
            Err(Error::InconsistentShares(_))
        ));

        assert!(matches!(Piece::combine(&[]), Err(Error::InvalidPiece(_))));
        assert!(matches!(
            Piece::combine(&[sample(), sample()]),
            Err(Error::InvariantViolation(_))
        ));
    }
}
