use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::time::Instant;

use crate::task::execution::{Resolver, Task};

/// Unique identifier for task instances
pub type TaskId = uuid::Uuid;

/// Work wrapped by an initializer-shaped task.
///
/// The `&Task` argument is the task being run, so the initializer can record
/// errors on it. Returning `Err` (or panicking) before the resolver is used
/// settles the task with `Value::Null`.
pub type Initializer = Box<dyn FnOnce(&Task, Resolver) -> anyhow::Result<()> + Send>;

/// Completion callback registered through [`Task::on_complete`].
pub type Subscriber = Box<dyn FnOnce(&Task, Value) -> anyhow::Result<()> + Send>;

/// Lifecycle of a task. Transitions are monotonic.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// No execution attempted yet
    Pending,
    /// Work dispatched, result not available
    Running,
    /// Terminal: result and error set are fixed
    Settled,
}

/// Which constructor shape a task was built from
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputShape {
    Empty,
    Literal,
    Initializer,
    Mapping,
}

/// A single entry of a mapping-shaped task: a plain value copied into the
/// result as is, or a sub-task whose settled value takes its slot.
#[derive(Clone, Debug)]
pub enum Entry {
    Value(Value),
    Task(Task),
}

impl Entry {
    pub fn is_task(&self) -> bool {
        matches!(self, Entry::Task(_))
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Value(value)
    }
}

impl From<Task> for Entry {
    fn from(task: Task) -> Self {
        Entry::Task(task)
    }
}

impl From<&Task> for Entry {
    fn from(task: &Task) -> Self {
        Entry::Task(task.clone())
    }
}

/// Tagged construction input. Each variant maps to one constructor on
/// [`Task`]; [`Task::from_input`] accepts any of them.
pub enum TaskInput {
    Empty,
    Literal(Value),
    Initializer(Initializer),
    Mapping(Vec<(String, Entry)>),
}

impl TaskInput {
    pub fn shape(&self) -> InputShape {
        match self {
            TaskInput::Empty => InputShape::Empty,
            TaskInput::Literal(_) => InputShape::Literal,
            TaskInput::Initializer(_) => InputShape::Initializer,
            TaskInput::Mapping(_) => InputShape::Mapping,
        }
    }
}

impl std::fmt::Debug for TaskInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskInput::Empty => f.write_str("Empty"),
            TaskInput::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            TaskInput::Initializer(_) => f.write_str("Initializer(..)"),
            TaskInput::Mapping(entries) => f.debug_tuple("Mapping").field(entries).finish(),
        }
    }
}

impl From<Value> for TaskInput {
    fn from(value: Value) -> Self {
        TaskInput::Literal(value)
    }
}

/// Stamp left on a task handed out by a memoization pool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStamp {
    pub key: String,
    pub at: Instant,
}

/// Errors captured into a task's error log
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The wrapped initializer failed before resolving
    #[error("Initializer failed: {0}")]
    Initializer(anyhow::Error),

    /// A transform function failed on the upstream result
    #[error("Transform failed: {0}")]
    Transform(anyhow::Error),

    /// A pipe factory failed to produce the next task
    #[error("Pipe failed: {0}")]
    Pipe(anyhow::Error),

    /// A completion callback failed after receiving the result
    #[error("Subscriber failed: {0}")]
    Subscriber(anyhow::Error),

    /// User code panicked
    #[error("Panicked: {0}")]
    Panicked(String),

    /// A bare message recorded with [`Task::error`]
    #[error("{0}")]
    Reported(String),

    #[error(transparent)]
    Other(anyhow::Error),
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        TaskError::Reported(message.to_string())
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        TaskError::Reported(message)
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(error: anyhow::Error) -> Self {
        TaskError::Other(error)
    }
}

/// Outcome of user code that did not complete normally
#[derive(Debug)]
pub(crate) enum Failure {
    Error(anyhow::Error),
    Panic(String),
}

impl Failure {
    /// Convert into a log entry, tagging returned errors with `wrap`
    pub(crate) fn into_task_error(self, wrap: fn(anyhow::Error) -> TaskError) -> TaskError {
        match self {
            Failure::Error(error) => wrap(error),
            Failure::Panic(message) => TaskError::Panicked(message),
        }
    }
}

/// Run user code, turning both `Err` returns and panics into a [`Failure`]
pub(crate) fn shield<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, Failure> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Failure::Error(error)),
        Err(payload) => Err(Failure::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// True iff `value` is a [`Task`] handle
pub fn is_task_like(value: &dyn Any) -> bool {
    value.is::<Task>()
}
