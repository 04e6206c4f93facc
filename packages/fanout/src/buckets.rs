//! The connection table of an event and the ordered walk over it.
//!
//! An event owns two of these tables: the live one, which is only touched while the dispatch
//! lock is held, and a staging one, which receives connections added while a fire is in
//! progress. Staging is merged into the live table at the start of the next fire, never
//! during one, so a walk never observes its own bucket growing.

use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Connection, EventState, Priority, Request};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Direction {
    /// Registration order.
    Forward,

    /// Most recently registered first.
    Reverse,
}

/// Connections grouped by priority.
#[derive(Debug)]
pub(crate) struct Buckets<A> {
    condition: Vec<Connection<A>>,
    first: Vec<Connection<A>>,
    positive: BTreeMap<i32, Vec<Connection<A>>>,
    zero: Vec<Connection<A>>,
    negative: BTreeMap<i32, Vec<Connection<A>>>,
    last: Vec<Connection<A>>,
}

impl<A> Buckets<A> {
    pub(crate) fn new() -> Self {
        Self {
            condition: Vec::new(),
            first: Vec::new(),
            positive: BTreeMap::new(),
            zero: Vec::new(),
            negative: BTreeMap::new(),
            last: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, priority: Priority, connection: Connection<A>) {
        match priority {
            Priority::Condition => self.condition.push(connection),
            Priority::First => self.first.push(connection),
            Priority::Last => self.last.push(connection),
            Priority::Numbered(0) => self.zero.push(connection),
            Priority::Numbered(p) if p > 0 => {
                self.positive.entry(p).or_default().push(connection);
            }
            Priority::Numbered(p) => self.negative.entry(p).or_default().push(connection),
        }
    }

    /// Moves every connection of `staged` to the end of the matching bucket of `self`.
    pub(crate) fn absorb(&mut self, staged: &mut Self) {
        if staged.is_empty() {
            return;
        }

        self.condition.append(&mut staged.condition);
        self.first.append(&mut staged.first);
        self.zero.append(&mut staged.zero);
        self.last.append(&mut staged.last);

        for (priority, mut connections) in mem::take(&mut staged.positive) {
            self.positive
                .entry(priority)
                .or_default()
                .append(&mut connections);
        }

        for (priority, mut connections) in mem::take(&mut staged.negative) {
            self.negative
                .entry(priority)
                .or_default()
                .append(&mut connections);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.condition.is_empty()
            && self.first.is_empty()
            && self.zero.is_empty()
            && self.last.is_empty()
            && self.positive.values().all(Vec::is_empty)
            && self.negative.values().all(Vec::is_empty)
    }

    /// Invokes every live connection in firing order.
    ///
    /// Connections that are found invalid, or that ask to be removed, are dropped from the table
    /// and `connections` is decremented for each of them as it happens, so the count stays
    /// accurate even if a callback unwinds out of the walk.
    pub(crate) fn fire(&mut self, state: &mut EventState, args: &A, connections: &AtomicUsize) {
        let mut walk = Walk {
            state,
            args,
            connections,
        };

        // A condition that returns `Skip` vetoes the whole fire, not just its own bucket.
        if walk.bucket(&mut self.condition, Direction::Forward) == Request::Skip {
            walk.state.skip();
        }

        if walk.state.is_skipped() {
            return;
        }

        walk.bucket(&mut self.first, Direction::Reverse);

        for bucket in self.positive.values_mut().rev() {
            if walk.state.is_skipped() {
                return;
            }

            walk.bucket(bucket, Direction::Forward);
        }

        if walk.state.is_skipped() {
            return;
        }

        walk.bucket(&mut self.zero, Direction::Forward);

        // Keys are negative, so walking them in descending order visits -1 before -2.
        for bucket in self.negative.values_mut().rev() {
            if walk.state.is_skipped() {
                return;
            }

            walk.bucket(bucket, Direction::Reverse);
        }

        if walk.state.is_skipped() {
            return;
        }

        walk.bucket(&mut self.last, Direction::Reverse);
    }

    /// Drops numbered buckets that no longer hold any connection.
    pub(crate) fn compact(&mut self) {
        self.positive.retain(|_, bucket| !bucket.is_empty());
        self.negative.retain(|_, bucket| !bucket.is_empty());
    }
}

struct Walk<'a, A> {
    state: &'a mut EventState,
    args: &'a A,
    connections: &'a AtomicUsize,
}

impl<A> Walk<'_, A> {
    /// Walks one bucket.
    ///
    /// Returns [`Request::Skip`] if a callback cut the bucket short, otherwise
    /// [`Request::Continue`]. The walk also stops early once the state has been skipped.
    fn bucket(&mut self, bucket: &mut Vec<Connection<A>>, direction: Direction) -> Request {
        match direction {
            Direction::Forward => self.forward(bucket),
            Direction::Reverse => self.reverse(bucket),
        }
    }

    #[expect(
        clippy::arithmetic_side_effects,
        reason = "index is bounded by the length of the bucket"
    )]
    fn forward(&mut self, bucket: &mut Vec<Connection<A>>) -> Request {
        let mut index = 0;

        while let Some(connection) = bucket.get_mut(index) {
            match self.visit(connection) {
                Visit::Keep => index += 1,
                Visit::Drop => self.drop_at(bucket, index),
                Visit::Skip => return Request::Skip,
            }

            if self.state.is_skipped() {
                break;
            }
        }

        Request::Continue
    }

    fn reverse(&mut self, bucket: &mut Vec<Connection<A>>) -> Request {
        let mut end = bucket.len();

        while let Some(index) = end.checked_sub(1) {
            end = index;

            let Some(connection) = bucket.get_mut(index) else {
                // A callback cannot reach this bucket, so it cannot have shrunk under us.
                break;
            };

            match self.visit(connection) {
                Visit::Keep => {}
                Visit::Drop => self.drop_at(bucket, index),
                Visit::Skip => return Request::Skip,
            }

            if self.state.is_skipped() {
                break;
            }
        }

        Request::Continue
    }

    fn visit(&mut self, connection: &mut Connection<A>) -> Visit {
        if !connection.is_valid() {
            return Visit::Drop;
        }

        match connection.invoke(self.state, self.args) {
            Request::Continue => Visit::Keep,
            Request::Remove => Visit::Drop,
            Request::Skip => Visit::Skip,
        }
    }

    fn drop_at(&self, bucket: &mut Vec<Connection<A>>, index: usize) {
        drop(bucket.remove(index));
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Visit {
    Keep,
    Drop,
    Skip,
}
