//! # Batch Scheduler
//!
//! Runs encrypt/decrypt over many keypairs with a bounded number in flight
//! and one smooth progress figure for the whole batch.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           BATCH EXECUTION                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  keypairs ──► weight per keypair (scheme cost)                          │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  ┌──────────────────────┐  at most max_concurrency in flight            │
//! │  │ yield ─► blocking    │─┐                                             │
//! │  │ pool: encrypt/decrypt│ │ per-unit fraction                           │
//! │  └──────────────────────┘ ▼                                             │
//! │                  ┌──────────────────┐                                   │
//! │                  │ ProgressTracker  │──► on_progress(p)                 │
//! │                  │ Σ wᵢ·fᵢ / Σ wᵢ   │    monotone, ends at 1.0          │
//! │                  └──────────────────┘                                   │
//! │                                                                         │
//! │  first error ──► abort, return it      cancel flag ──► Err(Cancelled)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Results come back in input order whatever the concurrency bound. The
//! keypairs passed in are consumed; callers keep their own copy and commit
//! only on success. Once `run` returns, its progress callback never fires
//! again, even for units still finishing on the blocking pool.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use zeroize::Zeroizing;

use crate::crypto::EncryptionScheme;
use crate::error::{Error, Result};
use crate::key::Keypair;
use crate::CoreConfig;

// ============================================================================
// CANCELLATION
// ============================================================================

/// Shared cooperative cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the flag can govern a new run
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// What to do to every keypair in a batch
pub enum BatchOp {
    /// Encrypt plain keypairs. `schemes` holds one scheme for the whole
    /// batch or one per keypair.
    Encrypt {
        /// Scheme assignment
        schemes: Vec<EncryptionScheme>,
        /// Passphrase
        passphrase: Zeroizing<String>,
    },
    /// Decrypt encrypted keypairs
    Decrypt {
        /// Passphrase
        passphrase: Zeroizing<String>,
    },
}

impl BatchOp {
    /// Encrypt operation
    pub fn encrypt(schemes: Vec<EncryptionScheme>, passphrase: &str) -> Self {
        BatchOp::Encrypt {
            schemes,
            passphrase: Zeroizing::new(passphrase.to_string()),
        }
    }

    /// Decrypt operation
    pub fn decrypt(passphrase: &str) -> Self {
        BatchOp::Decrypt {
            passphrase: Zeroizing::new(passphrase.to_string()),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            BatchOp::Encrypt { .. } => "encrypt",
            BatchOp::Decrypt { .. } => "decrypt",
        }
    }

    /// Split into per-keypair tasks and the shared passphrase
    fn into_tasks(self, count: usize) -> Result<(Vec<Task>, Zeroizing<String>)> {
        match self {
            BatchOp::Encrypt { schemes, passphrase } => {
                let tasks = match schemes.len() {
                    1 => vec![Task::Encrypt(schemes[0]); count],
                    n if n == count => schemes.into_iter().map(Task::Encrypt).collect(),
                    n => {
                        return Err(Error::InvalidPiece(format!(
                            "{} schemes given for {} keypairs",
                            n, count
                        )))
                    }
                };
                Ok((tasks, passphrase))
            }
            BatchOp::Decrypt { passphrase } => Ok((vec![Task::Decrypt; count], passphrase)),
        }
    }
}

impl fmt::Debug for BatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOp::Encrypt { schemes, .. } => f
                .debug_struct("Encrypt")
                .field("schemes", schemes)
                .finish_non_exhaustive(),
            BatchOp::Decrypt { .. } => f.debug_struct("Decrypt").finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Task {
    Encrypt(EncryptionScheme),
    Decrypt,
}

impl Task {
    fn weight(&self, keypair: &Keypair) -> u64 {
        match self {
            Task::Encrypt(scheme) => scheme.encrypt_weight(),
            Task::Decrypt => keypair.encryption().map(|s| s.decrypt_weight()).unwrap_or(0),
        }
    }

    fn apply(&self, keypair: &mut Keypair, passphrase: &str, on_progress: &dyn Fn(f64)) -> Result<()> {
        match self {
            Task::Encrypt(scheme) => keypair.encrypt_with_progress(*scheme, passphrase, on_progress),
            Task::Decrypt => keypair.decrypt_with_progress(passphrase, on_progress),
        }
    }
}

// ============================================================================
// PROGRESS
// ============================================================================

type ProgressFn = Box<dyn Fn(f64) + Send + Sync>;

struct ProgressState {
    fractions: Vec<f64>,
    reported: Option<f64>,
}

/// Weighted aggregate of per-keypair progress.
///
/// The callback runs under the lock, so an update and its report are never
/// interleaved with another. A halted tracker reports nothing.
struct ProgressTracker {
    weights: Vec<u64>,
    total: u64,
    state: Mutex<ProgressState>,
    cancel: CancelFlag,
    halted: AtomicBool,
    callback: ProgressFn,
}

impl ProgressTracker {
    fn new(weights: Vec<u64>, cancel: CancelFlag, callback: ProgressFn) -> Self {
        let total = weights.iter().sum();
        let state = ProgressState {
            fractions: vec![0.0; weights.len()],
            reported: None,
        };
        Self {
            weights,
            total,
            state: Mutex::new(state),
            cancel,
            halted: AtomicBool::new(false),
            callback,
        }
    }

    /// Stop all further reports. Waits for a report in progress to finish.
    fn halt(&self) {
        let _state = self.state.lock();
        self.halted.store(true, Ordering::SeqCst);
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    fn report(&self, index: usize, fraction: f64) {
        let mut state = self.state.lock();
        if self.is_halted() {
            return;
        }
        if let Some(slot) = state.fractions.get_mut(index) {
            *slot = slot.max(fraction.clamp(0.0, 1.0));
        }

        let value = if state.fractions.iter().all(|f| *f >= 1.0) {
            1.0
        } else if self.total == 0 {
            0.0
        } else {
            let done: f64 = self
                .weights
                .iter()
                .zip(&state.fractions)
                .map(|(w, f)| *w as f64 * f)
                .sum();
            (done / self.total as f64).min(1.0)
        };

        if state.reported.map_or(true, |last| value > last) {
            state.reported = Some(value);
            (self.callback)(value);
        }
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Bounded-concurrency batch runner
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    max_concurrency: usize,
    verbose: bool,
    cancel: CancelFlag,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BatchScheduler {
    /// Scheduler with at most `max_concurrency` keypairs in flight (minimum 1)
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            verbose: false,
            cancel: CancelFlag::new(),
        }
    }

    /// Scheduler sized from configuration
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.max_concurrency).with_verbose_logging(config.verbose_logging)
    }

    /// Log every finished keypair, not just batch start and end
    pub fn with_verbose_logging(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether per-keypair events are logged
    pub fn verbose_logging(&self) -> bool {
        self.verbose
    }

    /// Use an externally owned cancel flag
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The flag that cancels this scheduler's runs.
    ///
    /// It stays set after a cancel; every later run returns
    /// [`Error::Cancelled`] until it is [reset](CancelFlag::reset).
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Concurrency bound
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Apply `op` to every keypair.
    ///
    /// Returns the transformed keypairs in input order, or the first error.
    /// On error, units not yet started are skipped and units still running
    /// report nothing. Once cancelled no further progress is reported and
    /// the run returns [`Error::Cancelled`].
    pub async fn run<F>(&self, keypairs: Vec<Keypair>, op: BatchOp, on_progress: F) -> Result<Vec<Keypair>>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        let op_name = op.name();
        let count = keypairs.len();
        let (tasks, passphrase) = op.into_tasks(count)?;
        let weights = tasks
            .iter()
            .zip(&keypairs)
            .map(|(task, keypair)| task.weight(keypair))
            .collect();

        let tracker = Arc::new(ProgressTracker::new(
            weights,
            self.cancel.clone(),
            Box::new(on_progress),
        ));
        let passphrase = Arc::new(passphrase);

        tracing::info!(
            "Starting batch {} of {} keypairs (concurrency {})",
            op_name,
            count,
            self.max_concurrency
        );

        let units = keypairs.into_iter().zip(tasks).enumerate().map(|(index, (keypair, task))| {
            let tracker = Arc::clone(&tracker);
            let passphrase = Arc::clone(&passphrase);
            let cancel = self.cancel.clone();
            let verbose = self.verbose;
            async move {
                tokio::task::yield_now().await;
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                let progress = Arc::clone(&tracker);
                let keypair = tokio::task::spawn_blocking(move || {
                    if progress.is_halted() {
                        return Err(Error::Cancelled);
                    }
                    let mut keypair = keypair;
                    let on_progress = |p: f64| progress.report(index, p);
                    task.apply(&mut keypair, passphrase.as_str(), &on_progress)?;
                    Ok::<_, Error>(keypair)
                })
                .await
                .map_err(|e| Error::Internal(format!("batch worker panicked: {}", e)))??;

                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                tracker.report(index, 1.0);
                if verbose {
                    tracing::debug!("Batch {} finished keypair {}", op_name, index);
                }
                Ok((index, keypair))
            }
        });

        let collected: Result<Vec<(usize, Keypair)>> = stream::iter(units)
            .buffer_unordered(self.max_concurrency)
            .try_collect()
            .await;
        let mut results = match collected {
            Ok(results) => results,
            Err(e) => {
                tracker.halt();
                tracing::warn!("Batch {} aborted: {}", op_name, e);
                return Err(e);
            }
        };

        if self.cancel.is_cancelled() {
            tracker.halt();
            tracing::warn!("Batch {} cancelled", op_name);
            return Err(Error::Cancelled);
        }
        if count == 0 {
            tracker.report(0, 1.0);
        }

        results.sort_by_key(|(index, _)| *index);
        tracing::info!("Batch {} of {} keypairs complete", op_name, count);
        Ok(results.into_iter().map(|(_, keypair)| keypair).collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use parking_lot::Condvar;

    use super::*;
    use crate::plugin::mock::{init_tracing, MockCoin};
    use crate::plugin::{CurrencyPlugin, DecodedKey};

    /// BTC double whose address derivation blocks while the gate is closed
    struct GatedCoin {
        inner: Arc<dyn CurrencyPlugin>,
        gate: Arc<(Mutex<bool>, Condvar)>,
    }

    impl CurrencyPlugin for GatedCoin {
        fn ticker(&self) -> &str {
            self.inner.ticker()
        }

        fn name(&self) -> &str {
            self.inner.name()
        }

        fn decode(&self, key: &str) -> Result<DecodedKey> {
            self.inner.decode(key)
        }

        fn derive_address(&self, hex: &str) -> Result<String> {
            let (open, opened) = &*self.gate;
            let mut open = open.lock();
            while !*open {
                opened.wait(&mut open);
            }
            drop(open);
            self.inner.derive_address(hex)
        }

        fn is_valid_address(&self, address: &str) -> bool {
            self.inner.is_valid_address(address)
        }

        fn supported_encryption_schemes(&self) -> Vec<EncryptionScheme> {
            self.inner.supported_encryption_schemes()
        }
    }

    fn keypairs() -> Vec<Keypair> {
        vec![
            Keypair::generate(MockCoin::btc()).unwrap(),
            Keypair::generate(MockCoin::ltc()).unwrap(),
            Keypair::generate(MockCoin::btc()).unwrap(),
            Keypair::generate(MockCoin::eth()).unwrap(),
        ]
    }

    fn mixed_schemes() -> Vec<EncryptionScheme> {
        vec![
            EncryptionScheme::Bip38,
            EncryptionScheme::VersionedStrong,
            EncryptionScheme::VersionedStrong,
            EncryptionScheme::VersionedStrong,
        ]
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl Fn(f64) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |p: f64| sink.lock().push(p))
    }

    fn assert_monotone_to_one(values: &[f64]) {
        assert!(!values.is_empty());
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{:?}", values);
        assert_eq!(*values.last().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt_mixed_schemes() {
        init_tracing();
        let original = keypairs();
        let scheduler = BatchScheduler::new(1);

        let (seen, progress) = recorder();
        let encrypted = scheduler
            .run(original.clone(), BatchOp::encrypt(mixed_schemes(), "pw"), progress)
            .await
            .unwrap();
        assert_monotone_to_one(&seen.lock());
        for (kp, scheme) in encrypted.iter().zip(mixed_schemes()) {
            assert_eq!(kp.encryption(), Some(scheme));
        }

        let (seen, progress) = recorder();
        let decrypted = scheduler
            .run(encrypted, BatchOp::decrypt("pw"), progress)
            .await
            .unwrap();
        assert_monotone_to_one(&seen.lock());
        assert_eq!(decrypted, original);
    }

    #[tokio::test]
    async fn test_concurrency_does_not_change_result() {
        let original = keypairs();
        let scheme = vec![EncryptionScheme::VersionedStrong];
        let parallel = BatchScheduler::new(4);
        let (seen, progress) = recorder();
        let encrypted = parallel
            .run(original.clone(), BatchOp::encrypt(scheme, "pw"), progress)
            .await
            .unwrap();
        assert_monotone_to_one(&seen.lock());

        let decrypted = BatchScheduler::new(1)
            .run(encrypted, BatchOp::decrypt("pw"), |_| {})
            .await
            .unwrap();
        assert_eq!(decrypted, original);
    }

    #[tokio::test]
    async fn test_first_error_aborts() {
        let scheduler = BatchScheduler::new(2);
        let encrypted = scheduler
            .run(keypairs(), BatchOp::encrypt(vec![EncryptionScheme::VersionedStrong], "right"), |_| {})
            .await
            .unwrap();
        let err = scheduler
            .run(encrypted, BatchOp::decrypt("wrong"), |_| {})
            .await
            .unwrap_err();
        assert_eq!(err, Error::WrongPassphrase);

        // ETH does not offer BIP38
        let err = scheduler
            .run(keypairs(), BatchOp::encrypt(vec![EncryptionScheme::Bip38], "pw"), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(_)));
    }

    #[tokio::test]
    async fn test_error_silences_units_still_running() {
        let gate = Arc::new((Mutex::new(true), Condvar::new()));
        let gated: Arc<dyn CurrencyPlugin> = Arc::new(GatedCoin {
            inner: MockCoin::btc(),
            gate: Arc::clone(&gate),
        });
        let batch = vec![
            Keypair::generate(MockCoin::eth()).unwrap(),
            Keypair::generate(Arc::clone(&gated)).unwrap(),
        ];
        *gate.0.lock() = false;

        // ETH fails at once; the BTC unit is held inside BIP38 encryption
        let (seen, progress) = recorder();
        let err = BatchScheduler::new(2)
            .run(batch, BatchOp::encrypt(vec![EncryptionScheme::Bip38], "pw"), progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(_)));
        assert!(seen.lock().is_empty());

        *gate.0.lock() = true;
        gate.1.notify_all();

        // The BTC unit drops its keypair, and its plugin handle, when done
        let deadline = Instant::now() + Duration::from_secs(120);
        while Arc::strong_count(&gated) > 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(Arc::strong_count(&gated), 1);
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_reset_cancel_flag_allows_next_run() {
        let scheduler = BatchScheduler::new(1);
        let op = || BatchOp::encrypt(vec![EncryptionScheme::VersionedStrong], "pw");

        scheduler.cancel_flag().cancel();
        let err = scheduler.run(keypairs(), op(), |_| {}).await.unwrap_err();
        assert_eq!(err, Error::Cancelled);
        let err = scheduler.run(keypairs(), op(), |_| {}).await.unwrap_err();
        assert_eq!(err, Error::Cancelled);

        scheduler.cancel_flag().reset();
        let encrypted = scheduler.run(keypairs(), op(), |_| {}).await.unwrap();
        assert_eq!(encrypted.len(), 4);
    }

    #[tokio::test]
    async fn test_key_derivation_shows_as_partial_progress() {
        let (seen, progress) = recorder();
        BatchScheduler::default()
            .run(
                vec![Keypair::generate(MockCoin::btc()).unwrap()],
                BatchOp::encrypt(vec![EncryptionScheme::Bip38], "pw"),
                progress,
            )
            .await
            .unwrap();
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!((seen[0] - crate::crypto::KEY_DERIVED).abs() < 1e-9);
        assert_eq!(seen[1], 1.0);
    }

    #[test]
    fn test_halted_tracker_is_silent() {
        let (seen, progress) = recorder();
        let tracker = ProgressTracker::new(vec![1, 1], CancelFlag::new(), Box::new(progress));
        tracker.report(0, 1.0);
        tracker.halt();
        tracker.report(1, 1.0);
        assert_eq!(*seen.lock(), vec![0.5]);
    }

    #[tokio::test]
    async fn test_scheme_count_mismatch() {
        let err = BatchScheduler::default()
            .run(
                keypairs(),
                BatchOp::encrypt(vec![EncryptionScheme::VersionedStrong; 2], "pw"),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPiece(_)));
    }

    #[tokio::test]
    async fn test_cancel_suppresses_progress() {
        let cancel = CancelFlag::new();
        let scheduler = BatchScheduler::new(1).with_cancel_flag(cancel.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let trigger = cancel.clone();
        let progress = move |p: f64| {
            sink.lock().push(p);
            trigger.cancel();
        };

        let err = scheduler
            .run(
                keypairs(),
                BatchOp::encrypt(vec![EncryptionScheme::VersionedStrong], "pw"),
                progress,
            )
            .await
            .unwrap_err();
        assert_eq!(err, Error::Cancelled);
        assert_eq!(seen.lock().len(), 1);
        assert!(scheduler.cancel_flag().is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (seen, progress) = recorder();
        let out = BatchScheduler::default()
            .run(Vec::new(), BatchOp::decrypt("pw"), progress)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(*seen.lock(), vec![1.0]);
    }

    #[test]
    fn test_tracker_weights() {
        let (seen, progress) = recorder();
        let tracker = ProgressTracker::new(vec![100, 300], CancelFlag::new(), Box::new(progress));
        tracker.report(1, 0.5);
        tracker.report(0, 1.0);
        tracker.report(0, 1.0);
        tracker.report(1, 1.0);
        assert_eq!(*seen.lock(), vec![0.375, 0.625, 1.0]);
    }

    #[test]
    fn test_from_config() {
        let config = CoreConfig {
            max_concurrency: 3,
            verbose_logging: true,
        };
        let scheduler = BatchScheduler::from_config(&config);
        assert_eq!(scheduler.max_concurrency(), 3);
        assert!(scheduler.verbose_logging());
        assert!(!BatchScheduler::default().verbose_logging());
        assert_eq!(BatchScheduler::new(0).max_concurrency(), 1);
    }
}
