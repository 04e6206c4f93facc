use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError, Weak};

use tracing::{debug, trace};

use crate::{
    Buckets, Callback, Connection, ERR_POISONED_LOCK, EventBuilder, EventState, IntoRequest,
    Manager, Priority, Request, Validator,
};

/// A typed broadcast point: firing it invokes every live subscribed callback in priority order.
///
/// `A` is the argument type passed (by reference) to every callback. Use a tuple for events
/// with several arguments and `()` for events with none.
///
/// # Subscribing
///
/// * [`add()`][Self::add] - a callback taking `&A`.
/// * [`connect()`][Self::connect] - a callback that also receives the per-fire
///   [`EventState`], for skipping the rest of the fire or passing data along.
/// * [`add_for()`][Self::add_for] - a callback that only runs when the fire carries a payload
///   of a specific type.
/// * [`Handler`][crate::Handler] - an owned callback that unsubscribes itself when dropped.
///
/// Callbacks may return `()` or a [`Request`] to skip the rest of their bucket or to
/// unsubscribe themselves. See [`Priority`] for the firing order.
///
/// # Firing
///
/// [`fire()`][Self::fire] runs the subscribers on the calling thread before returning, unless a
/// [`Manager`] is attached, in which case the fire is queued on the manager and the subscribers
/// run when the manager is drained.
///
/// Firing never blocks on the event itself. A fire raised while the event is already firing
/// (from one of its own callbacks, or from another thread) is deferred and runs right after the
/// fire in progress, in the order such fires were raised. Likewise, a callback added while the
/// event is firing is first invoked by the next fire.
///
/// # Ownership
///
/// An event exclusively owns its subscriber table and is not `Clone`. To make one event drive
/// another, link them with [`link_to()`][Self::link_to] or [`link_from()`][Self::link_from].
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use fanout::{Event, Priority, Request};
///
/// let event = Event::<&'static str>::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let log = Arc::clone(&seen);
/// event.add(Priority::Last, move |word: &&str| log.lock().unwrap().push(format!("last {word}")));
///
/// let log = Arc::clone(&seen);
/// event.add(10, move |word: &&str| {
///     log.lock().unwrap().push(format!("high {word}"));
///     Request::Remove
/// });
///
/// event.fire("one");
/// event.fire("two");
///
/// assert_eq!(*seen.lock().unwrap(), ["high one", "last one", "last two"]);
/// ```
pub struct Event<A> {
    inner: Arc<EventInner<A>>,
}

impl<A> Event<A>
where
    A: Send + 'static,
{
    /// Creates an event that runs its subscribers synchronously when fired.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates an event whose fires are queued on `manager`.
    #[must_use]
    pub fn with_manager(manager: &Arc<Manager>) -> Self {
        Self::builder().manager(manager).build()
    }

    /// Starts configuring a new event.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use fanout::{Event, Manager};
    ///
    /// let manager = Arc::new(Manager::new());
    /// let event = Event::<u64>::builder()
    ///     .name("bytes_received")
    ///     .manager(&manager)
    ///     .build();
    ///
    /// assert_eq!(event.name(), Some("bytes_received"));
    /// ```
    #[must_use]
    pub fn builder() -> EventBuilder<A> {
        EventBuilder::new()
    }

    pub(crate) fn from_parts(name: Option<String>, manager: Option<Arc<Manager>>) -> Self {
        Self {
            inner: Arc::new(EventInner {
                name,
                live: Mutex::new(Buckets::new()),
                staged: Mutex::new(Buckets::new()),
                backlog: Mutex::new(VecDeque::new()),
                manager: Mutex::new(manager),
                connections: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribes `callback` at `priority`.
    ///
    /// The returned [`Validator`] reports whether the connection is still subscribed. Pass it to
    /// [`Invalidator::new()`][crate::Invalidator::new] to tie the connection to the lifetime of
    /// a guard object. Adding the same callback twice creates two independent connections.
    pub fn add<F, R>(&self, priority: impl Into<Priority>, mut callback: F) -> Validator
    where
        F: FnMut(&A) -> R + Send + 'static,
        R: IntoRequest,
    {
        self.insert(
            priority.into(),
            Box::new(move |_state: &mut EventState, args: &A| callback(args).into_request()),
        )
    }

    /// Subscribes a `callback` that also receives the [`EventState`] of each fire.
    pub fn connect<F, R>(&self, priority: impl Into<Priority>, mut callback: F) -> Validator
    where
        F: FnMut(&mut EventState, &A) -> R + Send + 'static,
        R: IntoRequest,
    {
        self.insert(
            priority.into(),
            Box::new(move |state: &mut EventState, args: &A| {
                callback(state, args).into_request()
            }),
        )
    }

    /// Subscribes a `callback` that only runs when the fire carries a payload of type `T`.
    ///
    /// For fires without such a payload the connection behaves as if it had returned
    /// [`Request::Continue`].
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// use fanout::{Event, EventState};
    ///
    /// struct Retry(u32);
    ///
    /// let event = Event::<()>::new();
    /// let retries = Arc::new(AtomicUsize::new(0));
    ///
    /// let counter = Arc::clone(&retries);
    /// event.add_for(0, move |retry: &Retry, _: &()| {
    ///     assert_eq!(retry.0, 3);
    ///     counter.fetch_add(1, Ordering::Relaxed);
    /// });
    ///
    /// event.fire(());
    /// event.fire_with_state((), EventState::with_payload(Retry(3)));
    ///
    /// assert_eq!(retries.load(Ordering::Relaxed), 1);
    /// ```
    pub fn add_for<T, F, R>(&self, priority: impl Into<Priority>, mut callback: F) -> Validator
    where
        T: Any,
        F: FnMut(&T, &A) -> R + Send + 'static,
        R: IntoRequest,
    {
        self.insert(
            priority.into(),
            Box::new(move |state: &mut EventState, args: &A| {
                state
                    .try_payload::<T>()
                    .map_or(Request::Continue, |payload| {
                        callback(payload, args).into_request()
                    })
            }),
        )
    }

    fn insert(&self, priority: Priority, callback: Callback<A>) -> Validator {
        let connection = Connection::new(callback);
        let validator = connection.validator().clone();

        self.inner.connections.fetch_add(1, Ordering::Relaxed);

        if let Some(mut live) = self.inner.try_lock_live() {
            live.insert(priority, connection);
        } else {
            trace!(
                event = self.inner.label(),
                ?priority,
                "event is firing, staging new connection"
            );

            self.inner
                .staged
                .lock()
                .expect(ERR_POISONED_LOCK)
                .insert(priority, connection);
        }

        validator
    }

    /// Fires the event with a fresh [`EventState`].
    pub fn fire(&self, args: A) {
        self.fire_with_state(args, EventState::new());
    }

    /// Fires the event with a caller-supplied [`EventState`], typically one carrying a payload.
    ///
    /// The skip flag of `state` is cleared before the first callback runs.
    pub fn fire_with_state(&self, args: A, state: EventState) {
        if let Some(manager) = self.manager() {
            trace!(event = self.inner.label(), "queueing fire on manager");

            let inner = Arc::clone(&self.inner);
            manager.queue(move || inner.fire_owned(args, state));
            return;
        }

        self.inner.fire_owned(args, state);
    }

    /// Makes every fire of this event also fire `target`, right after this event's own
    /// [`Priority::Last`] subscribers that were registered before the link.
    ///
    /// The forwarding connection holds `target` weakly and removes itself once `target` is
    /// dropped. Forwarded fires run synchronously even if `target` has a manager attached,
    /// and share the [`EventState`] payload of the originating fire. A skip inside `target`
    /// cancels only `target`'s own fire.
    ///
    /// Linking events into a cycle makes every fire circulate forever.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicU64, Ordering};
    ///
    /// use fanout::Event;
    ///
    /// let clicks = Event::<u32>::new();
    /// let totals = Event::<u64>::new();
    /// clicks.link_to(&totals);
    ///
    /// let sum = Arc::new(AtomicU64::new(0));
    /// let sink = Arc::clone(&sum);
    /// totals.add(0, move |value: &u64| {
    ///     sink.fetch_add(*value, Ordering::Relaxed);
    /// });
    ///
    /// clicks.fire(2);
    /// clicks.fire(3);
    ///
    /// assert_eq!(sum.load(Ordering::Relaxed), 5);
    /// ```
    pub fn link_to<B>(&self, target: &Event<B>) -> Validator
    where
        A: Clone,
        B: From<A> + Send + 'static,
    {
        let target = Arc::downgrade(&target.inner);
        self.connect(Priority::Last, forward_to(target))
    }

    /// Makes every fire of `source` also fire this event. See [`link_to()`][Self::link_to].
    pub fn link_from<B>(&self, source: &Event<B>) -> Validator
    where
        A: From<B>,
        B: Clone + Send + 'static,
    {
        source.link_to(self)
    }

    /// Attaches `manager`, so that subsequent fires are queued on it instead of running
    /// immediately. Replaces any previously attached manager.
    pub fn set_manager(&self, manager: &Arc<Manager>) {
        *self.inner.manager.lock().expect(ERR_POISONED_LOCK) = Some(Arc::clone(manager));
    }

    /// Detaches the manager, if any, so that subsequent fires run immediately.
    ///
    /// Fires already queued on the old manager stay queued there.
    pub fn clear_manager(&self) {
        *self.inner.manager.lock().expect(ERR_POISONED_LOCK) = None;
    }

    /// The manager fires are currently queued on, if any.
    #[must_use]
    pub fn manager(&self) -> Option<Arc<Manager>> {
        self.inner.manager.lock().expect(ERR_POISONED_LOCK).clone()
    }

    /// Number of connections that have not yet been removed.
    ///
    /// Connections whose validator has become invalid are only removed when the event next
    /// fires, so they are still counted until then. Connections added during a fire are
    /// counted immediately.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.connections.load(Ordering::Relaxed)
    }

    /// Whether the event has no connections. See [`len()`][Self::len].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A> Event<A> {
    /// The diagnostic name given to the event via its builder.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }
}

impl<A> Default for Event<A>
where
    A: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> AsRef<Self> for Event<A> {
    fn as_ref(&self) -> &Self {
        self
    }
}

impl<A> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.inner.name)
            .field("connections", &self.inner.connections.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A fire that could not run immediately because the event was already firing.
struct Pending<A> {
    args: A,
    state: EventState,
}

struct EventInner<A> {
    name: Option<String>,

    // The dispatch lock. Held for the whole walk, so `try_lock` failing means "firing".
    live: Mutex<Buckets<A>>,

    // Connections added while the dispatch lock was held.
    staged: Mutex<Buckets<A>>,

    // Fires raised while the dispatch lock was held, oldest first.
    backlog: Mutex<VecDeque<Pending<A>>>,

    manager: Mutex<Option<Arc<Manager>>>,

    connections: AtomicUsize,
}

impl<A> EventInner<A> {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    fn try_lock_live(&self) -> Option<MutexGuard<'_, Buckets<A>>> {
        match self.live.try_lock() {
            Ok(guard) => Some(guard),
            // Callbacks run while this lock is held, so a panicking callback poisons it. The walk
            // edits the buckets in place and leaves them consistent at every step, so carry on.
            Err(TryLockError::Poisoned(poisoned)) => {
                self.live.clear_poison();
                Some(poisoned.into_inner())
            }
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Fires with an owned state, bypassing the manager.
    fn fire_owned(&self, args: A, mut state: EventState) {
        self.discarding_backlog_on_unwind(|| {
            if let Some(mut live) = self.try_lock_live() {
                self.dispatch(&mut live, &args, &mut state);
            } else {
                self.defer(Pending { args, state });
            }

            self.drain_backlog();
        });
    }

    /// Fires with a state borrowed from an upstream fire, bypassing the manager.
    fn fire_linked(&self, args: A, state: &mut EventState) {
        self.discarding_backlog_on_unwind(|| {
            if let Some(mut live) = self.try_lock_live() {
                let upstream_skipped = state.is_skipped();
                self.dispatch(&mut live, &args, state);
                state.restore_skip(upstream_skipped);
            } else {
                self.defer(Pending {
                    args,
                    state: state.clone(),
                });
            }

            self.drain_backlog();
        });
    }

    /// Runs `body`, dropping every deferred fire if a callback panics inside it.
    ///
    /// The backlog is only drained by a fire that returns normally. Fires deferred during a
    /// panicking one would otherwise wait for some unrelated later fire and then run after it.
    fn discarding_backlog_on_unwind(&self, body: impl FnOnce()) {
        // The dispatch lock is already released when this runs, so any fire deferred from now
        // on is drained by the thread that deferred it.
        let mut finished = scopeguard::guard(false, |finished| {
            if !finished {
                self.discard_backlog();
            }
        });

        body();
        *finished = true;
    }

    fn discard_backlog(&self) {
        // Never panic while already unwinding. The backlog lock does not run callbacks, so it
        // is not poisoned in practice.
        let Ok(mut backlog) = self.backlog.lock() else {
            return;
        };

        let discarded = mem::take(&mut *backlog);
        drop(backlog);

        if !discarded.is_empty() {
            debug!(
                event = self.label(),
                discarded = discarded.len(),
                "callback panicked, discarding deferred fires"
            );
        }
    }

    fn defer(&self, pending: Pending<A>) {
        trace!(event = self.label(), "event is firing, deferring fire");

        self.backlog
            .lock()
            .expect(ERR_POISONED_LOCK)
            .push_back(pending);
    }

    #[cfg_attr(test, mutants::skip)] // Critical for progress - causes test timeouts if tampered.
    fn drain_backlog(&self) {
        loop {
            if self.backlog.lock().expect(ERR_POISONED_LOCK).is_empty() {
                return;
            }

            // Whoever holds the dispatch lock drains the backlog after releasing it, and checks
            // again afterwards, so nothing deferred before this point can be stranded.
            let Some(mut live) = self.try_lock_live() else {
                return;
            };

            while let Some(Pending { args, mut state }) = self.pop_backlog() {
                self.dispatch(&mut live, &args, &mut state);
            }
        }
    }

    fn pop_backlog(&self) -> Option<Pending<A>> {
        self.backlog.lock().expect(ERR_POISONED_LOCK).pop_front()
    }

    fn dispatch(&self, live: &mut Buckets<A>, args: &A, state: &mut EventState) {
        {
            let mut staged = self.staged.lock().expect(ERR_POISONED_LOCK);
            live.absorb(&mut staged);
        }

        state.begin();

        let before = self.connections.load(Ordering::Relaxed);
        live.fire(state, args, &self.connections);
        live.compact();

        trace!(
            event = self.label(),
            skipped = state.is_skipped(),
            detached = before.saturating_sub(self.connections.load(Ordering::Relaxed)),
            "fire complete"
        );
    }
}

fn forward_to<A, B>(target: Weak<EventInner<B>>) -> impl FnMut(&mut EventState, &A) -> Request
where
    A: Clone,
    B: From<A> + Send + 'static,
{
    move |state: &mut EventState, args: &A| {
        let Some(target) = target.upgrade() else {
            debug!("link target has been dropped, removing forwarding connection");
            return Request::Remove;
        };

        target.fire_linked(B::from(args.clone()), state);
        Request::Continue
    }
}
