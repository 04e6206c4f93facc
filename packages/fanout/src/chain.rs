use std::fmt;
use std::mem;
use std::sync::Mutex;

use crate::{ERR_POISONED_LOCK, Event, EventState, Validator};

/// An event that is fired by the events it follows, for building multi-stage pipelines.
///
/// [`follow()`][Self::follow] links an upstream event to the chain. Every fire of the upstream
/// then fires the chain as well, converting the argument with [`From`] and sharing the
/// [`EventState`] payload of the upstream fire. Chains can follow other chains.
///
/// The links hold the chain weakly: dropping the chain removes them from their upstream events
/// on the next upstream fire.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// use fanout::{Chain, Event};
///
/// let tcp_bytes = Event::<u32>::new();
/// let udp_bytes = Event::<u32>::new();
///
/// let all_bytes = Chain::<u64>::new();
/// all_bytes.follow(&tcp_bytes);
/// all_bytes.follow(&udp_bytes);
///
/// let total = Arc::new(AtomicU64::new(0));
/// let sink = Arc::clone(&total);
/// all_bytes.event().add(0, move |count: &u64| {
///     sink.fetch_add(*count, Ordering::Relaxed);
/// });
///
/// tcp_bytes.fire(100);
/// udp_bytes.fire(20);
///
/// assert_eq!(total.load(Ordering::Relaxed), 120);
/// ```
pub struct Chain<A> {
    event: Event<A>,
    links: Mutex<Vec<Validator>>,
}

impl<A> Chain<A>
where
    A: Send + 'static,
{
    /// Creates a chain that follows nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::from_event(Event::new())
    }

    /// Creates a chain around an existing event, keeping its subscribers and configuration.
    #[must_use]
    pub fn from_event(event: Event<A>) -> Self {
        Self {
            event,
            links: Mutex::new(Vec::new()),
        }
    }

    /// Fires the chain whenever `upstream` fires.
    ///
    /// The link runs in the `Last` bucket of `upstream`. It is bypassed when an earlier callback
    /// of `upstream` calls [`EventState::skip()`].
    pub fn follow<B>(&self, upstream: &impl AsRef<Event<B>>) -> Validator
    where
        A: From<B>,
        B: Clone + Send + 'static,
    {
        let link = self.event.link_from(upstream.as_ref());

        let mut links = self.links.lock().expect(ERR_POISONED_LOCK);
        links.retain(Validator::is_valid);
        links.push(link.clone());

        link
    }

    /// Stops following every upstream event.
    pub fn unfollow_all(&self) {
        let links = mem::take(&mut *self.links.lock().expect(ERR_POISONED_LOCK));

        for link in links {
            link.invalidate();
        }
    }

    /// Number of upstream links that are still connected.
    #[must_use]
    pub fn upstream_count(&self) -> usize {
        let mut links = self.links.lock().expect(ERR_POISONED_LOCK);
        links.retain(Validator::is_valid);
        links.len()
    }

    /// Fires the chain directly, as if one of its upstream events had fired.
    pub fn fire(&self, args: A) {
        self.event.fire(args);
    }

    /// Fires the chain directly with a caller-supplied state.
    pub fn fire_with_state(&self, args: A, state: EventState) {
        self.event.fire_with_state(args, state);
    }

    /// The chain's own event, for subscribing to it or following it with another chain.
    #[must_use]
    pub fn event(&self) -> &Event<A> {
        &self.event
    }
}

impl<A> Default for Chain<A>
where
    A: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> AsRef<Event<A>> for Chain<A> {
    fn as_ref(&self) -> &Event<A> {
        &self.event
    }
}

impl<A> fmt::Debug for Chain<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("event", &self.event)
            .field("links", &self.links.lock().expect(ERR_POISONED_LOCK).len())
            .finish()
    }
}
