//! Lazy work sources: descriptors are produced one at a time, never
//! materialized up front.

use crate::store::Query;

/// One unit of store work. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub id: u64,
    pub query: Query,
}

/// Where the dispatcher pulls work from.
///
/// A source says up front whether it is finite. On cancellation the
/// dispatcher asks a finite source how many descriptors it never handed out
/// and counts them as abandoned, so `remaining` must not walk the source.
pub trait WorkSource {
    fn next_task(&mut self) -> Option<TaskDescriptor>;

    /// Descriptors not yet pulled, or `None` for an unbounded source.
    fn remaining(&self) -> Option<u64>;
}

/// Yields the same query over and over, either `count` times or forever.
#[derive(Debug, Clone)]
pub struct RepeatSource {
    query: Query,
    next_id: u64,
    remaining: Option<u64>,
}

impl RepeatSource {
    pub fn finite(query: Query, count: u64) -> Self {
        Self {
            query,
            next_id: 0,
            remaining: Some(count),
        }
    }

    pub fn unbounded(query: Query) -> Self {
        Self {
            query,
            next_id: 0,
            remaining: None,
        }
    }

    /// `Some(n)` for a finite source, `None` for an unbounded one.
    pub fn from_count(query: Query, count: Option<u64>) -> Self {
        match count {
            Some(n) => Self::finite(query, n),
            None => Self::unbounded(query),
        }
    }
}

impl Iterator for RepeatSource {
    type Item = TaskDescriptor;

    fn next(&mut self) -> Option<TaskDescriptor> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        Some(TaskDescriptor {
            id,
            query: self.query.clone(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.remaining {
            Some(n) => {
                let n = usize::try_from(n).unwrap_or(usize::MAX);
                (n, Some(n))
            }
            None => (usize::MAX, None),
        }
    }
}

impl WorkSource for RepeatSource {
    fn next_task(&mut self) -> Option<TaskDescriptor> {
        self.next()
    }

    fn remaining(&self) -> Option<u64> {
        self.remaining
    }
}

/// An arbitrary iterator declared to hold `count` descriptors.
///
/// Yields at most `count`; if the iterator runs dry first, nothing is left.
#[derive(Debug, Clone)]
pub struct Bounded<I> {
    inner: I,
    left: u64,
}

impl<I> Bounded<I>
where
    I: Iterator<Item = TaskDescriptor>,
{
    pub fn new(inner: I, count: u64) -> Self {
        Self { inner, left: count }
    }
}

impl<I> WorkSource for Bounded<I>
where
    I: Iterator<Item = TaskDescriptor>,
{
    fn next_task(&mut self) -> Option<TaskDescriptor> {
        if self.left == 0 {
            return None;
        }
        match self.inner.next() {
            Some(task) => {
                self.left -= 1;
                Some(task)
            }
            None => {
                self.left = 0;
                None
            }
        }
    }

    fn remaining(&self) -> Option<u64> {
        Some(self.left)
    }
}

/// An arbitrary iterator that only ends when cancelled (or runs dry).
#[derive(Debug, Clone)]
pub struct Unbounded<I>(pub I);

impl<I> WorkSource for Unbounded<I>
where
    I: Iterator<Item = TaskDescriptor>,
{
    fn next_task(&mut self) -> Option<TaskDescriptor> {
        self.0.next()
    }

    fn remaining(&self) -> Option<u64> {
        None
    }
}

impl WorkSource for std::vec::IntoIter<TaskDescriptor> {
    fn next_task(&mut self) -> Option<TaskDescriptor> {
        self.next()
    }

    fn remaining(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64) -> TaskDescriptor {
        TaskDescriptor {
            id,
            query: Query::read("SELECT 1"),
        }
    }

    #[test]
    fn finite_yields_count_with_sequential_ids() {
        let ids: Vec<u64> = RepeatSource::finite(Query::read("SELECT 1"), 3)
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn size_hint_is_exact_for_finite_and_open_for_unbounded() {
        let mut src = RepeatSource::finite(Query::read("SELECT 1"), 5);
        src.next();
        assert_eq!(src.size_hint(), (4, Some(4)));
        assert_eq!(src.count(), 4);

        let src = RepeatSource::unbounded(Query::read("SELECT 1"));
        assert_eq!(src.size_hint().1, None);
        assert_eq!(src.take(1000).count(), 1000);
    }

    #[test]
    fn repeat_remaining_is_constant_time_for_huge_counts() {
        let mut src = RepeatSource::finite(Query::read("SELECT 1"), u64::MAX);
        src.next_task();
        assert_eq!(src.remaining(), Some(u64::MAX - 1));
        assert_eq!(RepeatSource::unbounded(Query::read("SELECT 1")).remaining(), None);
    }

    #[test]
    fn bounded_counts_down_and_stops_at_count() {
        let mut n = 0;
        let mut src = Bounded::new(
            std::iter::from_fn(move || {
                n += 1;
                Some(task(n))
            }),
            3,
        );
        assert_eq!(src.remaining(), Some(3));
        assert_eq!(src.next_task().map(|t| t.id), Some(1));
        assert_eq!(src.remaining(), Some(2));
        src.next_task();
        src.next_task();
        assert!(src.next_task().is_none());
        assert_eq!(src.remaining(), Some(0));
    }

    #[test]
    fn bounded_short_iterator_leaves_nothing() {
        let mut src = Bounded::new(vec![task(0)].into_iter(), 10);
        assert!(src.next_task().is_some());
        assert!(src.next_task().is_none());
        assert_eq!(src.remaining(), Some(0));
    }

    #[test]
    fn vec_source_and_unbounded_wrapper() {
        let mut src = vec![task(0), task(1)].into_iter();
        src.next_task();
        assert_eq!(WorkSource::remaining(&src), Some(1));

        let src = Unbounded(std::iter::repeat_with(|| task(0)));
        assert_eq!(src.remaining(), None);
    }
}
