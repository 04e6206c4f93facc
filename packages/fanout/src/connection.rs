use std::fmt;

use crate::{EventState, Request, Validator};

/// Type-erased callback stored in a connection.
pub(crate) type Callback<A> = Box<dyn FnMut(&mut EventState, &A) -> Request + Send>;

/// One subscribed callback together with the liveness token that guards it.
pub(crate) struct Connection<A> {
    callback: Callback<A>,
    validator: Validator,
}

impl<A> Connection<A> {
    pub(crate) fn new(callback: Callback<A>) -> Self {
        Self {
            callback,
            validator: Validator::new(),
        }
    }

    pub(crate) fn validator(&self) -> &Validator {
        &self.validator
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.validator.is_valid()
    }

    #[inline]
    pub(crate) fn invoke(&mut self, state: &mut EventState, args: &A) -> Request {
        (self.callback)(state, args)
    }

}

// Whether the connection was removed by its event or the event itself went away, holders of the
// validator can tell it is gone.
impl<A> Drop for Connection<A> {
    fn drop(&mut self) {
        self.validator.invalidate();
    }
}

impl<A> fmt::Debug for Connection<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Connection<u32>: Send);

    #[test]
    fn invoke_passes_arguments_and_returns_request() {
        let mut connection = Connection::<u32>::new(Box::new(
            |_state: &mut EventState, value: &u32| {
                if *value > 10 {
                    Request::Skip
                } else {
                    Request::Continue
                }
            },
        ));
        let mut state = EventState::new();

        assert_eq!(connection.invoke(&mut state, &5), Request::Continue);
        assert_eq!(connection.invoke(&mut state, &50), Request::Skip);
    }

    #[test]
    fn drop_invalidates_external_validators() {
        let connection =
            Connection::<()>::new(Box::new(|_state: &mut EventState, _: &()| Request::Continue));
        let validator = connection.validator().clone();
        assert!(connection.is_valid());

        drop(connection);

        assert!(!validator.is_valid());
    }
}
