/// What a callback asks the dispatcher to do after it has been invoked.
///
/// Callbacks that have nothing to say may simply return `()`, which is treated as
/// [`Request::Continue`] (see [`IntoRequest`]).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the dispatch protocol has exactly these outcomes, accepting the risk"
)]
pub enum Request {
    /// Proceed with the next connection.
    #[default]
    Continue,

    /// Stop invoking the remaining connections of the current priority bucket.
    ///
    /// When returned from a [`Priority::Condition`][crate::Priority::Condition] callback, the
    /// entire fire is abandoned instead.
    Skip,

    /// Unsubscribe the callback that returned this. It will not be invoked again.
    Remove,
}

/// Conversion of a callback return value into a [`Request`].
///
/// Implemented for `()` (always [`Request::Continue`]) and for [`Request`] itself, so that
/// callbacks only need to spell out a request when they want something other than continuing.
pub trait IntoRequest {
    /// Converts `self` into the request to hand to the dispatcher.
    fn into_request(self) -> Request;
}

impl IntoRequest for () {
    #[inline]
    fn into_request(self) -> Request {
        Request::Continue
    }
}

impl IntoRequest for Request {
    #[inline]
    fn into_request(self) -> Request {
        self
    }
}
