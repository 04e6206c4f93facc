#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and demos in the fanout workspace.

use std::fmt;
use std::mem;
use std::panic;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread;
use std::time::Duration;

/// Runs a test on a separate thread and fails it if it does not finish in time.
///
/// Dispatch bugs tend to show up as hangs (a deferred fire that is never drained, a drain that
/// never quiesces) rather than as assertion failures, so threaded tests wrap themselves in this.
///
/// The timeout is 10 seconds under normal conditions and 60 seconds under Miri, where thread
/// synchronization is significantly slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test function is executed directly, so that mutation testing can detect hanging mutants.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode). If the test
/// itself panics, the panic is resumed on the calling thread.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the watchdog has already given up on us.
        drop(tx.send(result));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread already delivered its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {timeout:?} - likely a fire or drain that never completes");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread disconnected without a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// An ordered, thread-safe record of callback invocations.
///
/// Clones share the same record, so one clone can be moved into each callback under test while
/// the test keeps another to inspect the order in which they ran.
///
/// # Example
///
/// ```rust
/// use testing::CallLog;
///
/// let log = CallLog::new();
/// let entry = log.clone();
///
/// let callback = move |value: u32| entry.record(format!("saw {value}"));
/// callback(1);
/// callback(2);
///
/// assert_eq!(log.entries(), ["saw 1", "saw 2"]);
/// ```
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    /// A snapshot of every entry recorded so far, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Removes and returns every entry recorded so far, oldest first.
    #[must_use]
    pub fn take(&self) -> Vec<String> {
        mem::take(&mut *self.lock())
    }

    /// Number of entries recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// How many entries are exactly `entry`.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.lock().iter().filter(|recorded| *recorded == entry).count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        // A test that panicked while recording has already failed; keep the entries readable.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CallLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.lock().iter()).finish()
    }
}
