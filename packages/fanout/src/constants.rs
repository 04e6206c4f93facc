// A poisoned lock on a bookkeeping structure means one of our own invariants was broken while the
// lock was held. No user code runs under these locks, so we cannot recover and we panic.
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock on internal bookkeeping - \
    continued execution is not safe because the subscriber table may be inconsistent";
