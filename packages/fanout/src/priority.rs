/// Where a connection is placed in the firing order of an [`Event`][crate::Event].
///
/// A fire walks the buckets in this order:
///
/// 1. [`Priority::Condition`], in registration order.
/// 2. [`Priority::First`], most recently registered first.
/// 3. Positive [`Priority::Numbered`] buckets, highest number first, each in registration order.
/// 4. `Numbered(0)`, in registration order.
/// 5. Negative [`Priority::Numbered`] buckets, `-1` before `-2`, each most recently
///    registered first.
/// 6. [`Priority::Last`], most recently registered first.
///
/// Plain integers convert into [`Priority::Numbered`]:
///
/// ```
/// use fanout::Priority;
///
/// assert_eq!(Priority::from(5), Priority::Numbered(5));
/// assert_eq!(Priority::default(), Priority::Numbered(0));
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the bucket layout is part of the firing contract, accepting the risk"
)]
pub enum Priority {
    /// Runs before everything else. Meant for gate callbacks that may call
    /// [`EventState::skip()`][crate::EventState::skip] to cancel the whole fire.
    Condition,

    /// Runs before all numbered buckets.
    First,

    /// An ordinary numbered bucket. Higher numbers run earlier.
    Numbered(i32),

    /// Runs after all numbered buckets.
    Last,
}

impl Priority {
    /// The highest numbered priority.
    pub const HIGHEST: Self = Self::Numbered(i32::MAX);

    /// The lowest numbered priority.
    pub const LOWEST: Self = Self::Numbered(i32::MIN);
}

impl Default for Priority {
    fn default() -> Self {
        Self::Numbered(0)
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self::Numbered(value)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn integers_become_numbered() {
        assert_eq!(Priority::from(-3), Priority::Numbered(-3));
        assert_eq!(Priority::from(0), Priority::default());
    }

    #[test]
    fn extremes_are_numbered() {
        assert_eq!(Priority::HIGHEST, Priority::Numbered(i32::MAX));
        assert_eq!(Priority::LOWEST, Priority::Numbered(i32::MIN));
    }
}
