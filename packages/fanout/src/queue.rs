use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::{ERR_POISONED_LOCK, Event, Priority, Request, Validator};

type Condition<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

/// A buffer of event arguments that are replayed through the queue's own event on demand.
///
/// Items enter the queue either directly via [`push()`][Self::push] or by
/// [subscribing the queue to another event][Self::subscribe_to], in which case every fire of
/// that event buffers a clone of its argument. Nothing is delivered until
/// [`process()`][Self::process] is called, which fires the queue's own event once per item.
///
/// Conditions added with [`add_condition()`][Self::add_condition] are checked as each item is
/// processed. An item for which any condition returns `false` is consumed without being
/// delivered.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// use fanout::{Event, Queue};
///
/// let readings = Event::<u32>::new();
/// let queue = Queue::<u32>::new();
/// queue.subscribe_to(&readings, 0);
/// queue.add_condition(|value: &u32| *value < 1000);
///
/// let total = Arc::new(AtomicU32::new(0));
/// let sink = Arc::clone(&total);
/// queue.event().add(0, move |value: &u32| {
///     sink.fetch_add(*value, Ordering::Relaxed);
/// });
///
/// readings.fire(10);
/// readings.fire(5000);
/// readings.fire(20);
/// assert_eq!(queue.len(), 3);
///
/// assert_eq!(queue.process(0), 3);
/// assert_eq!(total.load(Ordering::Relaxed), 30);
/// ```
pub struct Queue<A> {
    inner: Arc<QueueInner<A>>,
    event: Event<A>,
}

struct QueueInner<A> {
    buffer: Mutex<VecDeque<A>>,
    conditions: Mutex<Vec<Condition<A>>>,
}

impl<A> Queue<A>
where
    A: Send + 'static,
{
    /// Creates an empty queue whose event runs its subscribers synchronously.
    #[must_use]
    pub fn new() -> Self {
        Self::with_event(Event::new())
    }

    /// Creates an empty queue that replays items through `event`.
    ///
    /// Use this to give the replay event a name or a [`Manager`][crate::Manager].
    #[must_use]
    pub fn with_event(event: Event<A>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                buffer: Mutex::new(VecDeque::new()),
                conditions: Mutex::new(Vec::new()),
            }),
            event,
        }
    }

    /// Buffers a clone of the argument of every fire of `source`.
    ///
    /// The subscription holds the queue weakly and removes itself once the queue is dropped.
    pub fn subscribe_to(
        &self,
        source: &impl AsRef<Event<A>>,
        priority: impl Into<Priority>,
    ) -> Validator
    where
        A: Clone,
    {
        let inner = Arc::downgrade(&self.inner);

        source.as_ref().add(priority, move |args: &A| {
            let Some(inner) = inner.upgrade() else {
                return Request::Remove;
            };

            inner.push(args.clone());
            Request::Continue
        })
    }

    /// Buffers `args` for the next [`process()`][Self::process].
    pub fn push(&self, args: A) {
        self.inner.push(args);
    }

    /// Replays up to `max` buffered items in the order they were buffered, firing the queue's
    /// event once per item that passes every condition.
    ///
    /// With `max == 0`, every item buffered at the time of the call is processed. Items
    /// buffered while processing (for example by a subscriber of the queue's own event) wait
    /// for the next call. Returns the number of items taken from the buffer, delivered or not.
    pub fn process(&self, max: usize) -> usize {
        let budget = {
            let buffer = self.inner.buffer.lock().expect(ERR_POISONED_LOCK);

            if max == 0 { buffer.len() } else { max.min(buffer.len()) }
        };

        let conditions = self.inner.conditions.lock().expect(ERR_POISONED_LOCK).clone();

        let mut processed = 0;
        let mut dropped = 0_usize;

        while processed < budget {
            // The buffer lock is released before firing so that subscribers may push.
            let Some(item) = self.inner.buffer.lock().expect(ERR_POISONED_LOCK).pop_front()
            else {
                break;
            };

            processed = processed.saturating_add(1);

            if conditions.iter().all(|condition| condition(&item)) {
                self.event.fire(item);
            } else {
                dropped = dropped.saturating_add(1);
            }
        }

        if dropped > 0 {
            trace!(
                event = self.event.name().unwrap_or("<unnamed>"),
                processed,
                dropped,
                "queue dropped items that failed a condition"
            );
        }

        processed
    }

    /// Adds a predicate that every item must satisfy to be delivered by
    /// [`process()`][Self::process].
    pub fn add_condition<F>(&self, condition: F)
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.inner
            .conditions
            .lock()
            .expect(ERR_POISONED_LOCK)
            .push(Arc::new(condition));
    }

    /// Discards every buffered item, returning how many were discarded.
    pub fn purge(&self) -> usize {
        let mut buffer = self.inner.buffer.lock().expect(ERR_POISONED_LOCK);
        let purged = buffer.len();
        buffer.clear();
        purged
    }

    /// Discards every buffered item for which `predicate` returns `true`, returning how many
    /// were discarded. The remaining items keep their order.
    pub fn purge_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&A) -> bool,
    {
        // The predicate is user code, so it runs without the buffer lock held.
        let mut kept = mem::take(&mut *self.inner.buffer.lock().expect(ERR_POISONED_LOCK));
        let before = kept.len();
        kept.retain(|item| !predicate(item));
        let purged = before.saturating_sub(kept.len());

        // Anything pushed in the meantime goes after the survivors.
        let mut buffer = self.inner.buffer.lock().expect(ERR_POISONED_LOCK);
        kept.append(&mut buffer);
        *buffer = kept;

        purged
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.buffer.lock().expect(ERR_POISONED_LOCK).len()
    }

    /// Whether no item is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The event through which buffered items are delivered.
    #[must_use]
    pub fn event(&self) -> &Event<A> {
        &self.event
    }
}

impl<A> QueueInner<A> {
    fn push(&self, args: A) {
        self.buffer.lock().expect(ERR_POISONED_LOCK).push_back(args);
    }
}

impl<A> Default for Queue<A>
where
    A: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> AsRef<Event<A>> for Queue<A> {
    fn as_ref(&self) -> &Event<A> {
        &self.event
    }
}

impl<A> fmt::Debug for Queue<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field(
                "buffered",
                &self.inner.buffer.lock().expect(ERR_POISONED_LOCK).len(),
            )
            .field(
                "conditions",
                &self.inner.conditions.lock().expect(ERR_POISONED_LOCK).len(),
            )
            .field("event", &self.event)
            .finish()
    }
}
