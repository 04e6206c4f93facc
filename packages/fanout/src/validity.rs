//! Liveness tokens that let an event notice when a subscriber has gone away.
//!
//! A token is a shared boolean flag with two views:
//!
//! * [`Validator`] - the observing side. Every connection stored in an event carries one and
//!   every call to [`Event::add()`][crate::Event::add] hands a clone back to the caller.
//!   Checking it is a single atomic load.
//! * [`Invalidator`] - the owning side. While at least one clone of an invalidator is alive, the
//!   flag stays set. When the last clone is dropped, the flag is cleared and the connection is
//!   pruned the next time its event fires.
//!
//! Nothing is pushed to the event when an invalidator goes away. The event only finds out
//! lazily, when it walks its buckets.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Creates a new token, returning both of its sides.
///
/// # Example
///
/// ```
/// let (invalidator, validator) = fanout::token();
/// assert!(validator.is_valid());
///
/// drop(invalidator);
/// assert!(!validator.is_valid());
/// ```
#[must_use]
pub fn token() -> (Invalidator, Validator) {
    let validator = Validator::new();
    (Invalidator::new(&validator), validator)
}

/// The observing side of a liveness token.
///
/// Cloning a validator creates another observer of the same flag.
#[derive(Clone)]
pub struct Validator {
    flag: Arc<AtomicBool>,
}

impl Validator {
    pub(crate) fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the connection guarded by this token is still alive.
    ///
    /// Returns `false` once every [`Invalidator`] of the token has been dropped, once the
    /// connection has been removed from its event or once [`invalidate()`][Self::invalidate]
    /// has been called.
    #[must_use]
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clears the flag, detaching the guarded connection the next time its event fires.
    ///
    /// This is irreversible.
    pub fn invalidate(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Whether two validators observe the same flag.
    #[must_use]
    pub fn same_token(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("is_valid", &self.is_valid())
            .finish()
    }
}

/// The owning side of a liveness token.
///
/// Clones share ownership. The flag is cleared when the last clone is dropped, so a value that
/// owns invalidators (such as a [`Handler`][crate::Handler]) can be cloned and moved around
/// without detaching its subscriptions prematurely.
#[derive(Clone)]
pub struct Invalidator {
    owner: Arc<Owner>,
}

impl Invalidator {
    /// Takes ownership of the token observed by `validator`.
    ///
    /// Once this invalidator (and any clones of it) is dropped, `validator` and every clone of
    /// it will report the token as invalid.
    ///
    /// # Example
    ///
    /// ```
    /// use fanout::{Event, Invalidator};
    ///
    /// let event = Event::<u32>::new();
    /// let validator = event.add(0, |_| {});
    ///
    /// let guard = Invalidator::new(&validator);
    /// assert!(validator.is_valid());
    ///
    /// drop(guard);
    /// assert!(!validator.is_valid());
    /// ```
    #[must_use]
    pub fn new(validator: &Validator) -> Self {
        Self {
            owner: Arc::new(Owner {
                flag: Arc::clone(&validator.flag),
                armed: AtomicBool::new(true),
            }),
        }
    }

    /// A validator observing the same token.
    #[must_use]
    pub fn validator(&self) -> Validator {
        Validator {
            flag: Arc::clone(&self.owner.flag),
        }
    }

    /// Gives up ownership without clearing the flag.
    ///
    /// This affects every clone of this invalidator: none of them will clear the flag any more.
    /// The guarded connection then lives until it removes itself or its event is dropped.
    pub fn disarm(self) {
        self.owner.armed.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invalidator")
            .field("is_valid", &self.owner.flag.load(Ordering::Acquire))
            .field("armed", &self.owner.armed.load(Ordering::Acquire))
            .field("owners", &Arc::strong_count(&self.owner))
            .finish()
    }
}

struct Owner {
    flag: Arc<AtomicBool>,
    armed: AtomicBool,
}

impl Drop for Owner {
    fn drop(&mut self) {
        if self.armed.load(Ordering::Acquire) {
            self.flag.store(false, Ordering::Release);
        }
    }
}
