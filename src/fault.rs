//! Deferred failure reporting.
//!
//! A task that settles with a non-empty error log, and is not silent, reports
//! exactly one [`Fault::Settlement`] carrying the whole accumulated sequence.
//! A completion callback that fails reports a [`Fault::Subscriber`]. Faults go
//! to the task's [`FaultSink`]; the default sink logs them through `tracing`.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

use crate::task::{TaskError, TaskId};

/// An unrecoverable failure surfaced after the fact
#[derive(Debug, Clone)]
pub enum Fault {
    /// A task settled while its error log was non-empty
    Settlement {
        task: TaskId,
        errors: Vec<Arc<TaskError>>,
    },
    /// A completion callback failed
    Subscriber { task: TaskId, error: Arc<TaskError> },
}

impl Fault {
    pub fn task_id(&self) -> TaskId {
        match self {
            Fault::Settlement { task, .. } | Fault::Subscriber { task, .. } => *task,
        }
    }

    pub fn errors(&self) -> Vec<Arc<TaskError>> {
        match self {
            Fault::Settlement { errors, .. } => errors.clone(),
            Fault::Subscriber { error, .. } => vec![error.clone()],
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Settlement { task, errors } => {
                write!(f, "task {} settled with {} error(s)", task, errors.len())?;
                for error in errors {
                    write!(f, "\n  - {}", error)?;
                }
                Ok(())
            }
            Fault::Subscriber { task, error } => {
                write!(f, "subscriber of task {} failed: {}", task, error)
            }
        }
    }
}

/// Destination for task faults
pub trait FaultSink: Send + Sync {
    fn report(&self, fault: Fault);
}

impl<F> FaultSink for F
where
    F: Fn(Fault) + Send + Sync,
{
    fn report(&self, fault: Fault) {
        self(fault)
    }
}

/// Default sink: logs every fault at `error` level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl FaultSink for TracingSink {
    fn report(&self, fault: Fault) {
        error!(task = %fault.task_id(), "{}", fault);
    }
}

/// Sink forwarding faults into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Fault>,
}

impl ChannelSink {
    /// Create a sink and the receiver observing it
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Fault>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

impl FaultSink for ChannelSink {
    fn report(&self, fault: Fault) {
        if let Err(mpsc::error::SendError(fault)) = self.sender.send(fault) {
            // receiver is gone; never drop a fault silently
            TracingSink.report(fault);
        }
    }
}

pub(crate) fn default_sink() -> Arc<dyn FaultSink> {
    Arc::new(TracingSink)
}
