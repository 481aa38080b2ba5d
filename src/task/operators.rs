//! Composition operators.
//!
//! Every operator except [`Task::error`], [`Task::quiet`] and [`Task::track`]
//! returns a new initializer-shaped task that subscribes to the receiver when
//! it runs. The receiver is never modified beyond error-log linking, and the
//! derived task takes over responsibility for reporting the shared errors.

use serde_json::Value;

use crate::path;
use crate::task::execution::Task;
use crate::task::types::{TaskError, shield};

impl Task {
    /// Feed the settled result into `next` and continue with the task it
    /// returns.
    ///
    /// The next task is linked to this task's error log, so errors from
    /// either stage surface once, on the returned task. If `next` panics the
    /// returned task settles with `Value::Null` and records the panic.
    pub fn pipe<F>(&self, next: F) -> Task
    where
        F: FnOnce(Value) -> Task + Send + 'static,
    {
        let upstream = self.clone();
        let piped = Task::new(move |piped, resolver| {
            let piped = piped.clone();
            upstream.on_complete(move |upstream, value| {
                match shield(|| Ok(next(value))) {
                    Ok(next_task) => {
                        next_task.track(upstream);
                        next_task.on_complete(move |_, result| {
                            resolver.resolve(result);
                            Ok(())
                        });
                    }
                    Err(failure) => {
                        piped.push_error(failure.into_task_error(TaskError::Pipe));
                        resolver.resolve(Value::Null);
                    }
                }
                Ok(())
            });
            Ok(())
        });

        piped.track(self);
        piped
    }

    /// [`Task::pipe`] when a factory is given, otherwise this task itself
    pub fn maybe_pipe<F>(&self, next: Option<F>) -> Task
    where
        F: FnOnce(Value) -> Task + Send + 'static,
    {
        match next {
            Some(next) => self.pipe(next),
            None => self.clone(),
        }
    }

    /// Map the settled result through `map`.
    ///
    /// An `Err` (or panic) from `map` is captured into the shared error log
    /// and the returned task settles with `Value::Null`.
    pub fn transform<F>(&self, map: F) -> Task
    where
        F: FnOnce(Value) -> anyhow::Result<Value> + Send + 'static,
    {
        self.transform_with(move |_, value| map(value))
    }

    /// [`Task::transform`] with access to the derived task, e.g. to record
    /// extra errors through [`Task::error`]
    pub fn transform_with<F>(&self, map: F) -> Task
    where
        F: FnOnce(&Task, Value) -> anyhow::Result<Value> + Send + 'static,
    {
        let upstream = self.clone();
        let transformed = Task::new(move |transformed, resolver| {
            let transformed = transformed.clone();
            upstream.on_complete(move |_, value| {
                let mapped = match shield(|| map(&transformed, value)) {
                    Ok(mapped) => mapped,
                    Err(failure) => {
                        transformed.push_error(failure.into_task_error(TaskError::Transform));
                        Value::Null
                    }
                };
                resolver.resolve(mapped);
                Ok(())
            });
            Ok(())
        });

        transformed.track(self);
        transformed
    }

    /// Project a dotted `path` out of the settled result, yielding
    /// `Value::Null` when any segment is missing
    pub fn pick(&self, path: &str) -> Task {
        let path = path.to_string();
        self.transform(move |value| Ok(path::project(&value, &path)))
    }

    /// Record an error on this task's log. Bare messages become
    /// [`TaskError::Reported`].
    pub fn error(&self, error: impl Into<TaskError>) -> &Self {
        self.push_error(error.into());
        self
    }

    /// Never report this task's errors; a tracking task owns them instead
    pub fn quiet(self) -> Self {
        self.set_silent(true);
        self
    }

    /// Link this task to `upstream`.
    ///
    /// Both error logs become one sequence. This task adopts upstream's
    /// silence flag and fault sink, and upstream turns silent so the shared
    /// errors are reported only from here.
    pub fn track(&self, upstream: &Task) -> &Self {
        if self == upstream {
            return self;
        }

        self.error_log().merge_into(upstream.error_log());
        self.set_silent(upstream.is_silent());
        self.set_fault_sink(upstream.fault_sink());
        upstream.set_silent(true);
        self
    }
}
