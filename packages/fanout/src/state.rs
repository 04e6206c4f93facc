use std::any::{self, Any};
use std::fmt;
use std::sync::Arc;

use crate::PayloadError;

/// Transient context shared by every callback of a single fire.
///
/// A state carries two things:
///
/// * A skip flag. Once any callback calls [`skip()`][Self::skip], no further callbacks of the
///   current fire are invoked. The flag is cleared at the start of every fire.
/// * An optional typed payload, for passing data to later callbacks of the same fire without
///   widening the argument type of the event. Callbacks registered via
///   [`Event::add_for()`][crate::Event::add_for] only run when the payload has their type.
///
/// # Example
///
/// ```
/// use fanout::{Event, EventState, Priority};
///
/// let event = Event::<u32>::new();
///
/// // Cancel every fire with an odd argument.
/// event.connect(Priority::Condition, |state: &mut EventState, value: &u32| {
///     if value % 2 == 1 {
///         state.skip();
///     }
/// });
///
/// event.fire_with_state(3, EventState::with_payload("context"));
/// ```
#[derive(Clone, Default)]
pub struct EventState {
    skipped: bool,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl EventState {
    /// Creates a state without a payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state carrying `payload`.
    #[must_use]
    pub fn with_payload<T>(payload: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            skipped: false,
            payload: Some(Arc::new(payload)),
        }
    }

    /// Cancels the remainder of the current fire.
    pub fn skip(&mut self) {
        self.skipped = true;
    }

    /// Whether [`skip()`][Self::skip] has been called during the current fire.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Replaces the payload seen by the callbacks that run after the current one.
    pub fn set_payload<T>(&mut self, payload: T)
    where
        T: Any + Send + Sync,
    {
        self.payload = Some(Arc::new(payload));
    }

    /// Removes the payload.
    pub fn clear_payload(&mut self) {
        self.payload = None;
    }

    /// Whether a payload of any type is present.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Borrows the payload as a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Missing`] if there is no payload and
    /// [`PayloadError::TypeMismatch`] if the payload is not a `T`.
    pub fn payload<T>(&self) -> Result<&T, PayloadError>
    where
        T: Any,
    {
        let payload = self.payload.as_deref().ok_or(PayloadError::Missing)?;

        payload
            .downcast_ref::<T>()
            .ok_or(PayloadError::TypeMismatch {
                expected: any::type_name::<T>(),
            })
    }

    /// Borrows the payload as a `T`, if it is one.
    #[must_use]
    pub fn try_payload<T>(&self) -> Option<&T>
    where
        T: Any,
    {
        self.payload.as_deref()?.downcast_ref::<T>()
    }

    // Called by the dispatcher before the first bucket is walked.
    pub(crate) fn begin(&mut self) {
        self.skipped = false;
    }

    // A linked fire borrows the upstream state; its own skip must not leak back upstream.
    pub(crate) fn restore_skip(&mut self, skipped: bool) {
        self.skipped = skipped;
    }
}

impl fmt::Debug for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventState")
            .field("skipped", &self.skipped)
            .field("has_payload", &self.has_payload())
            .finish()
    }
}
