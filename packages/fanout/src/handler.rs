use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::{
    ERR_POISONED_LOCK, Event, EventState, IntoRequest, Invalidator, Priority, Request, Validator,
};

type SharedCallback<A> = Arc<dyn Fn(&mut EventState, &A) -> Request + Send + Sync>;

/// An owned callback that can be subscribed to any number of events and unsubscribes itself
/// from all of them when the last clone of the handler is dropped.
///
/// Each [`subscribe()`][Self::subscribe] adds one connection to the event and keeps the
/// [`Invalidator`] of that connection. Dropping the handler (or calling
/// [`unsubscribe()`][Self::unsubscribe]) invalidates the connections, which the events then
/// prune on their next fire.
///
/// The callback is `Fn`, not `FnMut`, because the same handler may be invoked by several events
/// at once, on one thread or several. Use interior mutability for state it needs to change.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use fanout::{Event, Handler};
///
/// let opened = Event::<u32>::new();
/// let closed = Event::<u32>::new();
///
/// let live = Arc::new(AtomicU32::new(0));
/// let counter = Arc::clone(&live);
/// let mut handler = Handler::new(move |_: &u32| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
///
/// handler.subscribe_all([&opened, &closed], 0);
///
/// opened.fire(1);
/// closed.fire(1);
/// assert_eq!(live.load(Ordering::Relaxed), 2);
///
/// drop(handler);
///
/// opened.fire(2);
/// assert_eq!(live.load(Ordering::Relaxed), 2);
/// assert!(opened.is_empty());
/// ```
pub struct Handler<A> {
    core: Arc<HandlerCore<A>>,
    subscriptions: Vec<Invalidator>,
}

struct HandlerCore<A> {
    // Cloned out before every call so that the lock is never held while user code runs.
    callback: Mutex<SharedCallback<A>>,
    enabled: AtomicBool,
}

impl<A> Handler<A>
where
    A: Send + 'static,
{
    /// Creates a handler from a callback taking the event arguments.
    #[must_use]
    pub fn new<F, R>(callback: F) -> Self
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
        R: IntoRequest,
    {
        Self::from_shared(Arc::new(move |_state: &mut EventState, args: &A| {
            callback(args).into_request()
        }))
    }

    /// Creates a handler from a callback that also receives the [`EventState`] of each fire.
    #[must_use]
    pub fn with_state<F, R>(callback: F) -> Self
    where
        F: Fn(&mut EventState, &A) -> R + Send + Sync + 'static,
        R: IntoRequest,
    {
        Self::from_shared(Arc::new(move |state: &mut EventState, args: &A| {
            callback(state, args).into_request()
        }))
    }

    /// Creates a handler that only runs for fires carrying a payload of type `T`.
    ///
    /// Fires without a payload, or with a payload of another type, pass the handler by. This is
    /// the handler counterpart of [`Event::add_for()`].
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicU32, Ordering};
    ///
    /// use fanout::{Event, EventState, Handler};
    ///
    /// struct Retry {
    ///     attempt: u32,
    /// }
    ///
    /// let failed = Event::<u32>::new();
    ///
    /// let attempts = Arc::new(AtomicU32::new(0));
    /// let sink = Arc::clone(&attempts);
    /// let mut retries = Handler::for_payload(move |retry: &Retry, _code: &u32| {
    ///     sink.fetch_add(retry.attempt, Ordering::Relaxed);
    /// });
    /// retries.subscribe(&failed, 0);
    ///
    /// failed.fire(503);
    /// assert_eq!(attempts.load(Ordering::Relaxed), 0);
    ///
    /// failed.fire_with_state(503, EventState::with_payload(Retry { attempt: 2 }));
    /// assert_eq!(attempts.load(Ordering::Relaxed), 2);
    /// ```
    #[must_use]
    pub fn for_payload<T, F, R>(callback: F) -> Self
    where
        T: Any,
        F: Fn(&T, &A) -> R + Send + Sync + 'static,
        R: IntoRequest,
    {
        Self::from_shared(Arc::new(move |state: &mut EventState, args: &A| {
            state
                .try_payload::<T>()
                .map_or(Request::Continue, |payload| {
                    callback(payload, args).into_request()
                })
        }))
    }

    /// Creates a handler that calls `method` on `receiver`.
    ///
    /// The handler holds `receiver` weakly. Once the receiver has been dropped, each connection
    /// of the handler removes itself the next time its event fires.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicU64, Ordering};
    ///
    /// use fanout::{Event, Handler};
    ///
    /// #[derive(Default)]
    /// struct Meter {
    ///     bytes: AtomicU64,
    /// }
    ///
    /// impl Meter {
    ///     fn on_read(&self, count: &u64) {
    ///         self.bytes.fetch_add(*count, Ordering::Relaxed);
    ///     }
    /// }
    ///
    /// let meter = Arc::new(Meter::default());
    /// let read = Event::<u64>::new();
    ///
    /// let mut handler = Handler::from_method(&meter, Meter::on_read);
    /// handler.subscribe(&read, 0);
    ///
    /// read.fire(512);
    /// assert_eq!(meter.bytes.load(Ordering::Relaxed), 512);
    /// ```
    #[must_use]
    pub fn from_method<T, R>(receiver: &Arc<T>, method: fn(&T, &A) -> R) -> Self
    where
        T: Send + Sync + 'static,
        R: IntoRequest + 'static,
    {
        let receiver = Arc::downgrade(receiver);

        Self::from_shared(Arc::new(move |_state: &mut EventState, args: &A| {
            receiver
                .upgrade()
                .map_or(Request::Remove, |receiver| method(&receiver, args).into_request())
        }))
    }

    fn from_shared(callback: SharedCallback<A>) -> Self {
        Self {
            core: Arc::new(HandlerCore {
                callback: Mutex::new(callback),
                enabled: AtomicBool::new(true),
            }),
            subscriptions: Vec::new(),
        }
    }

    /// Subscribes the handler to `event` at `priority`.
    ///
    /// The subscription lasts until every clone of this handler that shares it has been
    /// dropped or unsubscribed. Subscribing to the same event twice creates two connections.
    pub fn subscribe(
        &mut self,
        event: &impl AsRef<Event<A>>,
        priority: impl Into<Priority>,
    ) -> Validator {
        let core = Arc::downgrade(&self.core);
        let validator = event.as_ref().connect(priority, dispatch_to(core));

        // Subscriptions to events that have since been dropped are no longer worth holding.
        self.subscriptions
            .retain(|subscription| subscription.validator().is_valid());
        self.subscriptions.push(Invalidator::new(&validator));
        validator
    }

    /// Subscribes the handler to each of `events` at the same `priority`.
    pub fn subscribe_all<'e, E>(
        &mut self,
        events: impl IntoIterator<Item = &'e E>,
        priority: impl Into<Priority>,
    ) where
        E: AsRef<Event<A>> + 'e,
    {
        let priority = priority.into();

        for event in events {
            self.subscribe(event, priority);
        }
    }

    /// Drops this handle's share of every subscription.
    ///
    /// Subscriptions still shared with a clone of this handler stay alive until the clone lets
    /// go of them too.
    pub fn unsubscribe(&mut self) {
        self.subscriptions.clear();
    }

    /// Replaces the callback. Existing subscriptions (of this handler and its clones) invoke
    /// the new callback from now on.
    pub fn reset<F, R>(&self, callback: F)
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
        R: IntoRequest,
    {
        *self.core.callback.lock().expect(ERR_POISONED_LOCK) =
            Arc::new(move |_state: &mut EventState, args: &A| callback(args).into_request());
    }

    /// Replaces the callback with one that also receives the [`EventState`] of each fire.
    pub fn reset_with_state<F, R>(&self, callback: F)
    where
        F: Fn(&mut EventState, &A) -> R + Send + Sync + 'static,
        R: IntoRequest,
    {
        *self.core.callback.lock().expect(ERR_POISONED_LOCK) =
            Arc::new(move |state: &mut EventState, args: &A| callback(state, args).into_request());
    }

    /// Resumes invoking the callback after [`disable()`][Self::disable].
    pub fn enable(&self) {
        self.core.enabled.store(true, Ordering::Relaxed);
    }

    /// Stops invoking the callback without giving up any subscription.
    ///
    /// Affects every clone of the handler.
    pub fn disable(&self) {
        self.core.enabled.store(false, Ordering::Relaxed);
    }

    /// Whether the callback is currently invoked when a subscribed event fires.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.core.enabled.load(Ordering::Relaxed)
    }

}

impl<A> Handler<A> {
    /// Number of subscriptions held by this handle that are still connected.
    ///
    /// A subscription stops counting once it is removed from its event or the event is dropped.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .iter()
            .filter(|subscription| subscription.validator().is_valid())
            .count()
    }
}

fn dispatch_to<A>(core: Weak<HandlerCore<A>>) -> impl FnMut(&mut EventState, &A) -> Request {
    move |state: &mut EventState, args: &A| {
        let Some(core) = core.upgrade() else {
            return Request::Remove;
        };

        if !core.enabled.load(Ordering::Relaxed) {
            return Request::Continue;
        }

        let callback = Arc::clone(&core.callback.lock().expect(ERR_POISONED_LOCK));
        callback(state, args)
    }
}

impl<A> Clone for Handler<A> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            subscriptions: self.subscriptions.clone(),
        }
    }
}

impl<A> fmt::Debug for Handler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("enabled", &self.core.enabled.load(Ordering::Relaxed))
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;
    use testing::CallLog;

    use super::*;

    assert_impl_all!(Handler<u32>: Send, Sync, Clone);

    fn recording(log: &CallLog, label: &'static str) -> Handler<u32> {
        let log = log.clone();
        Handler::new(move |value: &u32| log.record(format!("{label}:{value}")))
    }

    #[test]
    fn drop_unsubscribes_from_every_event() {
        let first = Event::<u32>::new();
        let second = Event::<u32>::new();
        let log = CallLog::new();

        let mut handler = recording(&log, "h");
        handler.subscribe(&first, 0);
        handler.subscribe(&second, Priority::Last);
        assert_eq!(handler.subscription_count(), 2);

        first.fire(1);
        drop(handler);
        first.fire(2);
        second.fire(3);

        assert_eq!(log.entries(), ["h:1"]);
        assert!(first.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn clones_share_subscriptions_until_last_drop() {
        let event = Event::<u32>::new();
        let log = CallLog::new();

        let mut handler = recording(&log, "h");
        handler.subscribe(&event, 0);
        let copy = handler.clone();

        drop(handler);
        event.fire(1);
        assert_eq!(log.entries(), ["h:1"]);

        drop(copy);
        event.fire(2);
        assert_eq!(log.entries(), ["h:1"]);
    }

    #[test]
    fn unsubscribe_keeps_handler_usable() {
        let event = Event::<u32>::new();
        let log = CallLog::new();

        let mut handler = recording(&log, "h");
        let first = handler.subscribe(&event, 0);

        handler.unsubscribe();
        assert!(!first.is_valid());
        assert_eq!(handler.subscription_count(), 0);

        handler.subscribe(&event, 0);
        event.fire(5);

        assert_eq!(log.entries(), ["h:5"]);
        assert_eq!(event.len(), 1);
    }

    #[test]
    fn disable_gates_without_unsubscribing() {
        let event = Event::<u32>::new();
        let log = CallLog::new();

        let mut handler = recording(&log, "h");
        handler.subscribe(&event, 0);

        handler.disable();
        assert!(!handler.is_enabled());
        event.fire(1);

        handler.enable();
        event.fire(2);

        assert_eq!(log.entries(), ["h:2"]);
        assert_eq!(handler.subscription_count(), 1);
    }

    #[test]
    fn reset_swaps_callback_for_all_clones() {
        let event = Event::<u32>::new();
        let log = CallLog::new();

        let mut handler = recording(&log, "old");
        handler.subscribe(&event, 0);
        let copy = handler.clone();

        let entry = log.clone();
        copy.reset(move |value: &u32| entry.record(format!("new:{value}")));
        event.fire(4);

        assert_eq!(log.entries(), ["new:4"]);
    }

    #[test]
    fn reset_with_state_installs_state_aware_callback() {
        let event = Event::<u32>::new();
        let log = CallLog::new();

        let mut handler = recording(&log, "old");
        handler.subscribe(&event, Priority::First);

        let mut body = recording(&log, "body");
        body.subscribe(&event, 0);

        let entry = log.clone();
        handler.reset_with_state(move |state: &mut EventState, value: &u32| {
            entry.record(format!("gate:{value}"));
            state.skip();
        });
        event.fire(3);

        assert_eq!(log.entries(), ["gate:3"]);
    }

    #[test]
    fn dropped_event_stops_counting() {
        let kept = Event::<u32>::new();
        let log = CallLog::new();

        let mut handler = recording(&log, "h");
        handler.subscribe(&kept, 0);

        let transient = Event::<u32>::new();
        handler.subscribe(&transient, 0);
        assert_eq!(handler.subscription_count(), 2);

        drop(transient);
        assert_eq!(handler.subscription_count(), 1);
    }

    #[test]
    fn subscriptions_to_dropped_events_are_released() {
        let log = CallLog::new();
        let mut handler = recording(&log, "h");

        for _ in 0..1000 {
            let transient = Event::<u32>::new();
            handler.subscribe(&transient, 0);
        }

        assert_eq!(handler.subscription_count(), 0);
        assert!(handler.subscriptions.len() <= 1);
        assert!(format!("{handler:?}").contains("subscriptions: 0"));
    }

    #[test]
    fn payload_handler_runs_only_for_matching_payload() {
        let event = Event::<u32>::new();
        let log = CallLog::new();

        let entry = log.clone();
        let mut handler = Handler::for_payload(move |label: &String, value: &u32| {
            entry.record(format!("{label}:{value}"));
        });
        handler.subscribe(&event, 0);

        event.fire(1);
        event.fire_with_state(2, EventState::with_payload(7_u64));
        event.fire_with_state(3, EventState::with_payload(String::from("tagged")));

        assert_eq!(log.entries(), ["tagged:3"]);
        assert_eq!(handler.subscription_count(), 1);
    }

    #[test]
    fn payload_handler_can_remove_itself() {
        let event = Event::<u32>::new();

        let mut handler = Handler::for_payload(|_: &u8, _: &u32| Request::Remove);
        let validator = handler.subscribe(&event, 0);

        event.fire(1);
        assert!(validator.is_valid());

        event.fire_with_state(2, EventState::with_payload(1_u8));
        assert!(!validator.is_valid());
        assert!(event.is_empty());
        assert_eq!(handler.subscription_count(), 0);
    }

    #[test]
    fn method_handler_removes_itself_when_receiver_is_gone() {
        struct Receiver {
            log: CallLog,
        }

        impl Receiver {
            fn on_value(&self, value: &u32) {
                self.log.record(format!("method:{value}"));
            }
        }

        let event = Event::<u32>::new();
        let log = CallLog::new();
        let receiver = Arc::new(Receiver { log: log.clone() });

        let mut handler = Handler::from_method(&receiver, Receiver::on_value);
        let validator = handler.subscribe(&event, 0);

        event.fire(1);
        drop(receiver);
        event.fire(2);

        assert_eq!(log.entries(), ["method:1"]);
        assert!(!validator.is_valid());
        assert_eq!(handler.subscription_count(), 0);
    }

    #[test]
    fn state_handler_can_skip_rest_of_fire() {
        let event = Event::<u32>::new();
        let log = CallLog::new();

        let mut gate = Handler::with_state(|state: &mut EventState, value: &u32| {
            if *value > 100 {
                state.skip();
            }
        });
        gate.subscribe(&event, Priority::First);

        let mut body = recording(&log, "body");
        body.subscribe(&event, 0);

        event.fire(500);
        event.fire(5);

        assert_eq!(log.entries(), ["body:5"]);
    }

    #[test]
    fn handler_fired_by_two_events_from_within_itself() {
        let outer = Arc::new(Event::<u32>::new());
        let inner = Arc::new(Event::<u32>::new());
        let log = CallLog::new();

        let target = Arc::downgrade(&inner);
        let entry = log.clone();
        let mut handler = Handler::new(move |value: &u32| {
            entry.record(format!("saw {value}"));

            if *value == 1 {
                target.upgrade().unwrap().fire(2);
            }
        });
        handler.subscribe(&outer, 0);
        handler.subscribe(&inner, 0);

        outer.fire(1);

        assert_eq!(log.entries(), ["saw 1", "saw 2"]);
    }
}
