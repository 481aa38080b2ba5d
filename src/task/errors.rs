use parking_lot::Mutex;
use std::sync::Arc;

use crate::task::types::TaskError;

/// Shared, append-only sequence of captured task errors.
///
/// Cloning an `ErrorLog` yields another handle to the same sequence. Two
/// distinct logs can be merged with [`ErrorLog::merge_into`]; afterwards both
/// resolve to one sequence, so an append through either handle (or through any
/// log merged earlier) is visible to all of them.
///
/// A merged group can additionally be attached to a parent log with
/// [`ErrorLog::reparent`]. Unlike a merge this link is replaceable: attaching
/// the group to a new parent detaches it from the previous one, and the two
/// parents never see each other's entries.
#[derive(Clone, Default)]
pub struct ErrorLog(Arc<LogCell>);

#[derive(Default)]
struct LogCell {
    entries: Mutex<Vec<Arc<TaskError>>>,
    forward: Mutex<Option<ErrorLog>>,
    parent: Mutex<Option<ErrorLog>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn same(&self, other: &ErrorLog) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn next(&self) -> Option<ErrorLog> {
        let forward = self.0.forward.lock().clone();
        forward.or_else(|| self.0.parent.lock().clone())
    }

    /// Representative of the merged group, ignoring parent links
    fn group(&self) -> ErrorLog {
        let mut current = self.clone();
        loop {
            let next = current.0.forward.lock().clone();
            match next {
                Some(next) => current = next,
                None => return current,
            }
        }
    }

    /// Log actually holding the entries: the group, then its parents
    fn root(&self) -> ErrorLog {
        let mut current = self.clone();
        while let Some(next) = current.next() {
            current = next;
        }
        current
    }

    /// Whether resolving this log passes through `node`
    fn resolves_through(&self, node: &ErrorLog) -> bool {
        let mut current = Some(self.clone());
        while let Some(log) = current {
            if log.same(node) {
                return true;
            }
            current = log.next();
        }
        false
    }

    /// Append an error to the merged sequence
    pub fn push(&self, error: TaskError) {
        self.root().0.entries.lock().push(Arc::new(error));
    }

    pub fn len(&self) -> usize {
        self.root().0.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the entries in append order
    pub fn snapshot(&self) -> Vec<Arc<TaskError>> {
        self.root().0.entries.lock().clone()
    }

    pub fn first(&self) -> Option<Arc<TaskError>> {
        self.root().0.entries.lock().first().cloned()
    }

    /// Whether both handles resolve to the same sequence
    pub fn shares_with(&self, other: &ErrorLog) -> bool {
        self.root().same(&other.root())
    }

    /// Merge this log's identity into `target`.
    ///
    /// Entries already recorded here are moved to the end of `target`'s
    /// sequence and this log forwards to it from now on.
    pub fn merge_into(&self, target: &ErrorLog) {
        let from = self.group();
        let to = target.group();
        if target.resolves_through(&from) {
            return;
        }

        let moved = std::mem::take(&mut *from.0.entries.lock());
        *from.0.parent.lock() = None;
        to.root().0.entries.lock().extend(moved);
        *from.0.forward.lock() = Some(to);
    }

    /// Attach this log's merged group to `parent`, replacing any previous
    /// parent.
    ///
    /// Entries recorded while the group had no parent move to `parent`;
    /// entries already delivered to a previous parent stay there.
    pub fn reparent(&self, parent: &ErrorLog) {
        let child = self.group();
        if parent.resolves_through(&child) {
            return;
        }

        let previous = child.0.parent.lock().replace(parent.clone());
        if previous.is_none() {
            let moved = std::mem::take(&mut *child.0.entries.lock());
            parent.root().0.entries.lock().extend(moved);
        }
    }
}

impl std::fmt::Debug for ErrorLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}
