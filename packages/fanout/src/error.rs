use thiserror::Error;

/// Errors that can occur when reading the typed payload of an [`EventState`][crate::EventState].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PayloadError {
    /// The fire that produced this state did not carry a payload.
    #[error("event state does not carry a payload")]
    Missing,

    /// The state carries a payload but it is of a different type than the one requested.
    #[error("event state payload is not of the requested type '{expected}'")]
    TypeMismatch {
        /// Name of the type that the caller asked for.
        expected: &'static str,
    },
}
