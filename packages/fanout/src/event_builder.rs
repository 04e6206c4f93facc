use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{Event, Manager};

/// Builder for creating an instance of [`Event`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use fanout::{Event, Manager};
///
/// // Synchronous, unnamed event.
/// let event = Event::<u32>::builder().build();
///
/// // Named event whose fires are queued on a manager.
/// let manager = Arc::new(Manager::new());
/// let event = Event::<u32>::builder()
///     .name("connection_closed")
///     .manager(&manager)
///     .build();
/// ```
#[must_use]
pub struct EventBuilder<A> {
    name: Option<String>,
    manager: Option<Arc<Manager>>,

    _args: PhantomData<fn() -> A>,
}

impl<A> EventBuilder<A>
where
    A: Send + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            name: None,
            manager: None,
            _args: PhantomData,
        }
    }

    /// Sets a diagnostic name for the event, used in log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Queues every fire of the event on `manager` instead of running subscribers immediately.
    ///
    /// The manager can be replaced or removed later via [`Event::set_manager()`] and
    /// [`Event::clear_manager()`].
    pub fn manager(mut self, manager: &Arc<Manager>) -> Self {
        self.manager = Some(Arc::clone(manager));
        self
    }

    /// Builds the event with the specified configuration.
    #[must_use]
    pub fn build(self) -> Event<A> {
        Event::from_parts(self.name, self.manager)
    }
}

impl<A> fmt::Debug for EventBuilder<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBuilder")
            .field("name", &self.name)
            .field("manager", &self.manager.is_some())
            .finish_non_exhaustive()
    }
}
