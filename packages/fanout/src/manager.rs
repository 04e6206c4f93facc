use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Instant;

use tracing::{debug, trace};

use crate::ERR_POISONED_LOCK;

type Job = Box<dyn FnOnce() + Send>;

struct QueuedJob {
    job: Job,
    queued_at: Instant,
}

impl QueuedJob {
    fn run(self) {
        trace!(waited = ?self.queued_at.elapsed(), "running deferred job");

        (self.job)();
    }
}

/// A queue of deferred jobs that decouples raising an event from running its subscribers.
///
/// When an [`Event`][crate::Event] has a manager attached, firing the event does not invoke any
/// subscriber. Instead, the fire is packaged into a job and queued here. The subscribers run
/// when somebody drains the manager by calling one of:
///
/// * [`run_next()`][Self::run_next] - runs the oldest job.
/// * [`run_all()`][Self::run_all] - runs the jobs that were queued when the call started. Jobs
///   queued by those jobs wait for the next drain.
/// * [`run()`][Self::run] - keeps draining until the manager is observed empty.
/// * [`run_until()`][Self::run_until] - like `run()` but stops starting new jobs after a
///   deadline.
///
/// Jobs run in the order they were queued. There is no cancellation: a job whose subscribers
/// have all gone away simply does nothing observable.
///
/// The manager never spawns threads. It is typically shared via [`Arc`][std::sync::Arc] between
/// the threads that fire events and the thread that drains it.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use fanout::{Event, Manager};
///
/// let manager = Arc::new(Manager::new());
/// let event = Event::<u32>::with_manager(&manager);
///
/// let total = Arc::new(AtomicU32::new(0));
/// let sink = Arc::clone(&total);
/// event.add(0, move |value: &u32| {
///     sink.fetch_add(*value, Ordering::Relaxed);
/// });
///
/// event.fire(5);
/// assert_eq!(total.load(Ordering::Relaxed), 0);
///
/// manager.run_all();
/// assert_eq!(total.load(Ordering::Relaxed), 5);
/// ```
pub struct Manager {
    // Held for the whole duration of a drain. Jobs queued while it is held go to `staged`.
    live: Mutex<VecDeque<QueuedJob>>,
    staged: Mutex<VecDeque<QueuedJob>>,

    // Jobs in either queue. Readable from inside a job, unlike the queues themselves.
    pending: AtomicUsize,
}

impl Manager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: Mutex::new(VecDeque::new()),
            staged: Mutex::new(VecDeque::new()),
            pending: AtomicUsize::new(0),
        }
    }

    /// Queues a job to run on the next drain.
    ///
    /// Never blocks on a drain in progress: if one is running, the job is staged and becomes
    /// visible to the drain that follows it.
    pub fn queue<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job = QueuedJob {
            job: Box::new(job),
            queued_at: Instant::now(),
        };

        self.pending.fetch_add(1, Ordering::Relaxed);

        if let Some(mut live) = self.try_lock_live() {
            live.push_back(job);
        } else {
            self.staged.lock().expect(ERR_POISONED_LOCK).push_back(job);
        }
    }

    /// Runs the oldest queued job.
    ///
    /// Returns `false` if there was nothing to run or if another drain is in progress.
    #[cfg_attr(test, mutants::skip)] // Mutating the return value hangs `while run_next()` loops.
    pub fn run_next(&self) -> bool {
        let Some(mut live) = self.try_lock_live() else {
            trace!("run_next ignored: drain already in progress");
            return false;
        };

        self.merge_staged(&mut live);

        let Some(job) = live.pop_front() else {
            return false;
        };

        self.pending.fetch_sub(1, Ordering::Relaxed);
        job.run();

        true
    }

    /// Runs every job that is queued at the time of the call.
    ///
    /// Jobs queued while these run (including fires raised by subscribers of a managed event)
    /// are left for the next drain. Returns the number of jobs run, which is zero if another
    /// drain is in progress.
    pub fn run_all(&self) -> usize {
        let Some(mut live) = self.try_lock_live() else {
            trace!("run_all ignored: drain already in progress");
            return 0;
        };

        self.merge_staged(&mut live);
        let ran = self.run_generation(&mut live, None);

        debug!(ran, "manager drained one generation");
        ran
    }

    /// Runs jobs until the manager is observed empty, including jobs queued by jobs.
    ///
    /// Returns the number of jobs run, which is zero if another drain is in progress. Never
    /// returns if jobs keep queueing more jobs forever.
    pub fn run(&self) -> usize {
        self.drain(None)
    }

    /// Runs jobs until the manager is observed empty or `deadline` has passed.
    ///
    /// A job that has started always runs to completion; the deadline is only checked before
    /// starting each job. Jobs not started remain queued in their original order.
    ///
    /// Returns the number of jobs run, which is zero if another drain is in progress.
    pub fn run_until(&self, deadline: Instant) -> usize {
        self.drain(Some(deadline))
    }

    /// Number of jobs waiting to run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Whether no job is waiting to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[expect(
        clippy::arithmetic_side_effects,
        reason = "cannot run more jobs than fit in memory"
    )]
    fn drain(&self, deadline: Option<Instant>) -> usize {
        let Some(mut live) = self.try_lock_live() else {
            trace!("drain ignored: drain already in progress");
            return 0;
        };

        let mut ran = 0;
        let mut generations = 0_usize;

        loop {
            self.merge_staged(&mut live);

            if live.is_empty() || deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }

            ran += self.run_generation(&mut live, deadline);
            generations += 1;
        }

        debug!(ran, generations, "manager drained");
        ran
    }

    /// Runs the jobs currently in `live`, leaving any that were not started at its front.
    #[expect(
        clippy::arithmetic_side_effects,
        reason = "cannot run more jobs than fit in memory"
    )]
    fn run_generation(
        &self,
        live: &mut MutexGuard<'_, VecDeque<QueuedJob>>,
        deadline: Option<Instant>,
    ) -> usize {
        let batch = mem::take(&mut **live);
        let mut ran = 0;

        // If a job panics or the deadline passes, whatever has not started goes back to the
        // front of the queue, ahead of anything queued since.
        let mut remaining = scopeguard::guard(batch, |remaining| {
            for job in remaining.into_iter().rev() {
                live.push_front(job);
            }
        });

        while deadline.is_none_or(|deadline| Instant::now() < deadline) {
            let Some(job) = remaining.pop_front() else {
                break;
            };

            self.pending.fetch_sub(1, Ordering::Relaxed);
            job.run();
            ran += 1;
        }

        ran
    }

    fn merge_staged(&self, live: &mut VecDeque<QueuedJob>) {
        let mut staged = self.staged.lock().expect(ERR_POISONED_LOCK);

        if staged.is_empty() {
            return;
        }

        let interleaved = live
            .back()
            .zip(staged.front())
            .is_some_and(|(newest_live, oldest_staged)| {
                oldest_staged.queued_at < newest_live.queued_at
            });

        live.append(&mut staged);

        // A job that lost the race for the live queue may have been queued earlier than one
        // that won it. Restore enqueue order; the sort is stable so equal stamps keep FIFO.
        if interleaved {
            live.make_contiguous().sort_by_key(|job| job.queued_at);
        }
    }

    fn try_lock_live(&self) -> Option<MutexGuard<'_, VecDeque<QueuedJob>>> {
        match self.live.try_lock() {
            Ok(guard) => Some(guard),
            // Jobs run while this lock is held, so a panicking job poisons it. The queue itself
            // is always left consistent, so carry on.
            Err(TryLockError::Poisoned(poisoned)) => {
                self.live.clear_poison();
                Some(poisoned.into_inner())
            }
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}
