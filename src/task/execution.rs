use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::fault::{Fault, FaultSink, default_sink};
use crate::task::errors::ErrorLog;
use crate::task::types::*;

/// A lazy, memoized unit of asynchronous work.
///
/// `Task` is a handle: clones refer to the same instance and compare equal.
/// Nothing runs at construction time. The first [`Task::on_complete`] call
/// dispatches the wrapped work exactly once; every later subscriber, before
/// or after settlement, is served the same result.
///
/// Subscribers are always invoked on a later scheduler tick (via
/// `tokio::spawn`), never inside the call that registered them, and in
/// registration order.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    id: TaskId,
    shape: InputShape,
    state: Mutex<State>,
    errors: ErrorLog,
    silent: AtomicBool,
    sink: Mutex<Arc<dyn FaultSink>>,
    stamp: Mutex<Option<CacheStamp>>,
}

enum State {
    /// Empty and literal tasks: no work, no transitions
    Immediate(Value),
    Pending(Work),
    Running(Vec<Subscriber>),
    Settled(Value),
}

enum Work {
    Initializer(Initializer),
    Mapping(Vec<(String, Entry)>),
}

/// Settles the task it was handed to.
///
/// Consumed on use, so one resolver resolves at most once. Any resolution
/// arriving after the task already settled is ignored.
pub struct Resolver {
    task: Task,
}

impl Resolver {
    pub fn resolve(self, value: impl Into<Value>) {
        self.task.settle(value.into());
    }

    /// The task this resolver settles
    pub fn task(&self) -> &Task {
        &self.task
    }
}

impl Task {
    /// Build a task from any input shape
    pub fn from_input(input: TaskInput) -> Self {
        let shape = input.shape();
        let state = match input {
            TaskInput::Empty => State::Immediate(Value::Null),
            TaskInput::Literal(value) => State::Immediate(value),
            TaskInput::Initializer(initializer) => State::Pending(Work::Initializer(initializer)),
            TaskInput::Mapping(entries) => State::Pending(Work::Mapping(entries)),
        };

        Self {
            inner: Arc::new(TaskInner {
                id: TaskId::new_v4(),
                shape,
                state: Mutex::new(state),
                errors: ErrorLog::new(),
                silent: AtomicBool::new(false),
                sink: Mutex::new(default_sink()),
                stamp: Mutex::new(None),
            }),
        }
    }

    /// A task delivering `Value::Null`
    pub fn empty() -> Self {
        Self::from_input(TaskInput::Empty)
    }

    /// A task delivering `value` unchanged
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::from_input(TaskInput::Literal(value.into()))
    }

    /// Wrap callback-style work.
    ///
    /// The initializer runs on the first subscription and settles the task
    /// through its [`Resolver`], synchronously or from spawned work.
    pub fn new<F>(initializer: F) -> Self
    where
        F: FnOnce(&Task, Resolver) -> anyhow::Result<()> + Send + 'static,
    {
        Self::from_input(TaskInput::Initializer(Box::new(initializer)))
    }

    /// Fan-in over named entries.
    ///
    /// Settles with an object holding every entry in order, sub-tasks
    /// replaced by their settled values, once all sub-tasks have settled.
    pub fn mapping<I, K, E>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, E)>,
        K: Into<String>,
        E: Into<Entry>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, entry)| (key.into(), entry.into()))
            .collect();
        Self::from_input(TaskInput::Mapping(entries))
    }

    /// Spawn `future` on first subscription and settle with its output
    pub fn from_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Value> + Send + 'static,
    {
        Self::new(move |_, resolver| {
            tokio::spawn(async move {
                resolver.resolve(future.await);
            });
            Ok(())
        })
    }

    /// Like [`Task::from_future`], capturing an `Err` into the error log and
    /// settling with `Value::Null`
    pub fn try_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(move |_, resolver| {
            tokio::spawn(async move {
                match future.await {
                    Ok(value) => resolver.resolve(value),
                    Err(error) => {
                        resolver.task().push_error(TaskError::Initializer(error));
                        resolver.resolve(Value::Null);
                    }
                }
            });
            Ok(())
        })
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn shape(&self) -> InputShape {
        self.inner.shape
    }

    /// Current lifecycle state. Empty and literal tasks stay `Pending`.
    pub fn state(&self) -> TaskState {
        match &*self.inner.state.lock() {
            State::Immediate(_) | State::Pending(_) => TaskState::Pending,
            State::Running(_) => TaskState::Running,
            State::Settled(_) => TaskState::Settled,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state() == TaskState::Settled
    }

    pub fn is_silent(&self) -> bool {
        self.inner.silent.load(Ordering::SeqCst)
    }

    /// Enable or disable deferred fault reporting for this task
    pub fn set_silent(&self, silent: bool) {
        self.inner.silent.store(silent, Ordering::SeqCst);
    }

    /// Errors captured so far, in append order
    pub fn errors(&self) -> Vec<Arc<TaskError>> {
        self.inner.errors.snapshot()
    }

    /// Handle to the (possibly shared) error log
    pub fn error_log(&self) -> &ErrorLog {
        &self.inner.errors
    }

    pub(crate) fn push_error(&self, error: TaskError) {
        debug!(task = %self.id(), error = %error, "captured task error");
        self.inner.errors.push(error);
    }

    /// Route this task's faults to `sink`
    pub fn with_fault_sink(self, sink: Arc<dyn FaultSink>) -> Self {
        self.set_fault_sink(sink);
        self
    }

    pub fn set_fault_sink(&self, sink: Arc<dyn FaultSink>) {
        *self.inner.sink.lock() = sink;
    }

    pub fn fault_sink(&self) -> Arc<dyn FaultSink> {
        self.inner.sink.lock().clone()
    }

    /// Pool key this task was stored under, if any
    pub fn cache_key(&self) -> Option<String> {
        self.inner.stamp.lock().as_ref().map(|stamp| stamp.key.clone())
    }

    /// When a pool stored this task, if ever
    pub fn cached_at(&self) -> Option<Instant> {
        self.inner.stamp.lock().as_ref().map(|stamp| stamp.at)
    }

    pub(crate) fn stamp(&self, key: String, at: Instant) {
        *self.inner.stamp.lock() = Some(CacheStamp { key, at });
    }

    /// Register a completion callback, dispatching the work on first use.
    ///
    /// The callback receives this task and the settled value on a later
    /// scheduler tick. If it fails or panics the failure is reported to the
    /// fault sink, unless the task is silent.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn on_complete<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&Task, Value) -> anyhow::Result<()> + Send + 'static,
    {
        let subscriber: Subscriber = Box::new(callback);
        let mut state = self.inner.state.lock();

        let ready = match &mut *state {
            State::Immediate(value) | State::Settled(value) => Some(value.clone()),
            State::Running(subscribers) => {
                subscribers.push(subscriber);
                return self;
            }
            State::Pending(_) => None,
        };

        if let Some(value) = ready {
            drop(state);
            self.deliver_later(value, subscriber);
            return self;
        }

        let previous = std::mem::replace(&mut *state, State::Running(vec![subscriber]));
        drop(state);
        if let State::Pending(work) = previous {
            self.dispatch(work);
        }

        self
    }

    /// Wait for the settled value.
    ///
    /// The subscription is registered when the returned future is first
    /// polled, so an unpolled future never dispatches the task.
    pub fn settled(&self) -> BoxFuture<'static, Value> {
        let task = self.clone();
        Box::pin(async move {
            let (sender, receiver) = oneshot::channel();
            task.on_complete(move |_, value| {
                let _ = sender.send(value);
                Ok(())
            });
            receiver.await.unwrap_or(Value::Null)
        })
    }

    fn dispatch(&self, work: Work) {
        debug!(task = %self.id(), shape = ?self.shape(), "dispatching task");

        match work {
            Work::Initializer(initializer) => {
                let resolver = Resolver { task: self.clone() };
                if let Err(failure) = shield(|| initializer(self, resolver)) {
                    self.push_error(failure.into_task_error(TaskError::Initializer));
                    self.settle(Value::Null);
                }
            }
            Work::Mapping(entries) => self.run_mapping(entries),
        }
    }

    fn run_mapping(&self, entries: Vec<(String, Entry)>) {
        let gate = Arc::new(FanIn::new(self.clone(), entries.len()));
        let mut children = Vec::new();

        for (index, (key, entry)) in entries.into_iter().enumerate() {
            match entry {
                Entry::Value(value) => gate.fill(index, key, value),
                Entry::Task(child) => {
                    gate.open(index, key);
                    children.push((index, child));
                }
            }
        }

        for (index, child) in children {
            child.inner.errors.reparent(&self.inner.errors);
            child.set_silent(true);

            let gate = gate.clone();
            child.on_complete(move |_, value| {
                gate.complete(index, value);
                Ok(())
            });
        }

        gate.release();
    }

    /// Transition to `Settled` and schedule delivery.
    fn settle(&self, value: Value) {
        let subscribers = {
            let mut state = self.inner.state.lock();
            match std::mem::replace(&mut *state, State::Settled(value.clone())) {
                State::Running(subscribers) => subscribers,
                previous => {
                    *state = previous;
                    debug!(task = %self.id(), "ignoring late resolution");
                    return;
                }
            }
        };

        debug!(
            task = %self.id(),
            subscribers = subscribers.len(),
            errors = self.inner.errors.len(),
            "task settled"
        );

        let task = self.clone();
        tokio::spawn(async move {
            for subscriber in subscribers {
                task.deliver(value.clone(), subscriber);
                tokio::task::yield_now().await;
            }
            // includes errors recorded by the subscribers above
            if !task.is_silent() && !task.inner.errors.is_empty() {
                task.fault_sink().report(Fault::Settlement {
                    task: task.id(),
                    errors: task.inner.errors.snapshot(),
                });
            }
        });
    }

    fn deliver_later(&self, value: Value, subscriber: Subscriber) {
        let task = self.clone();
        tokio::spawn(async move {
            task.deliver(value, subscriber);
        });
    }

    fn deliver(&self, value: Value, subscriber: Subscriber) {
        trace!(task = %self.id(), "delivering result");

        let Err(failure) = shield(|| subscriber(self, value)) else {
            return;
        };
        let error = failure.into_task_error(TaskError::Subscriber);

        if self.is_silent() {
            debug!(task = %self.id(), error = %error, "subscriber failed on silent task");
        } else {
            self.fault_sink().report(Fault::Subscriber {
                task: self.id(),
                error: Arc::new(error),
            });
        }
    }
}

/// Counting gate for mapping tasks.
///
/// Starts with one outstanding unit held for the duration of entry
/// enumeration, so the gate cannot close while sub-tasks are still being
/// dispatched.
struct FanIn {
    task: Task,
    slots: Mutex<Vec<Option<(String, Value)>>>,
    outstanding: AtomicUsize,
}

impl FanIn {
    fn new(task: Task, len: usize) -> Self {
        Self {
            task,
            slots: Mutex::new(vec![None; len]),
            outstanding: AtomicUsize::new(1),
        }
    }

    fn fill(&self, index: usize, key: String, value: Value) {
        self.slots.lock()[index] = Some((key, value));
    }

    fn open(&self, index: usize, key: String) {
        self.fill(index, key, Value::Null);
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    fn complete(&self, index: usize, value: Value) {
        if let Some((_, slot)) = self.slots.lock()[index].as_mut() {
            *slot = value;
        }
        self.release();
    }

    fn release(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            let result: Map<String, Value> = std::mem::take(&mut *self.slots.lock())
                .into_iter()
                .flatten()
                .collect();
            self.task.settle(Value::Object(result));
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Task {}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("shape", &self.shape())
            .field("state", &self.state())
            .field("silent", &self.is_silent())
            .field("errors", &self.inner.errors.len())
            .finish()
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for Task {
    fn from(value: Value) -> Self {
        Self::literal(value)
    }
}

impl IntoFuture for Task {
    type Output = Value;
    type IntoFuture = BoxFuture<'static, Value>;

    fn into_future(self) -> Self::IntoFuture {
        self.settled()
    }
}
