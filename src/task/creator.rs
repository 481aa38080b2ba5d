//! Wrappers around task creators, functions that build a [`Task`] from
//! arguments.

use crate::task::execution::Task;
use crate::task::types::Entry;

/// Let `hook` short-circuit `creator`.
///
/// The hook sees the arguments first. A returned [`Entry::Task`] is used as
/// the result, a returned [`Entry::Value`] becomes a literal task, and `None`
/// falls through to `creator`. A creator returning `None` yields
/// [`Task::empty`].
pub fn before<A, C, H>(creator: C, hook: H) -> impl Fn(A) -> Task
where
    C: Fn(&A) -> Option<Task>,
    H: Fn(&A) -> Option<Entry>,
{
    move |args: A| match hook(&args) {
        Some(Entry::Task(task)) => task,
        Some(Entry::Value(value)) => Task::literal(value),
        None => creator(&args).unwrap_or_default(),
    }
}

/// Let `hook` decorate or replace what `creator` builds.
///
/// The hook receives the created task (or [`Task::empty`] when the creator
/// returns `None`) together with the arguments; returning `Some` replaces
/// the task, `None` keeps it.
pub fn after<A, C, H>(creator: C, hook: H) -> impl Fn(A) -> Task
where
    C: Fn(&A) -> Option<Task>,
    H: Fn(&Task, &A) -> Option<Task>,
{
    move |args: A| {
        let task = creator(&args).unwrap_or_default();
        hook(&task, &args).unwrap_or(task)
    }
}
