#[cfg(test)]
mod tests {
    use crate::fault::{ChannelSink, Fault};
    use crate::task::types::*;
    use crate::task::execution::*;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // Let spawned deliveries and fault reports run
    async fn run_pending_ticks() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    fn counting_task(counter: Arc<AtomicUsize>) -> Task {
        Task::new(move |_, resolver| {
            let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
            resolver.resolve(json!(count));
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_literal_passthrough() {
        assert_eq!(Task::literal(0).await, json!(0));
        assert_eq!(Task::literal(1).await, json!(1));
        assert_eq!(Task::literal("OK").await, json!("OK"));
        assert_eq!(
            Task::literal(json!({"a": 1, "b": 0})).await,
            json!({"a": 1, "b": 0})
        );
        assert_eq!(Task::empty().await, Value::Null);
    }

    #[tokio::test]
    async fn test_input_shapes() {
        assert_eq!(Task::empty().shape(), InputShape::Empty);
        assert_eq!(Task::literal(3).shape(), InputShape::Literal);
        assert_eq!(Task::new(|_, _| Ok(())).shape(), InputShape::Initializer);
        assert_eq!(
            Task::mapping([("a", Entry::from(json!(1)))]).shape(),
            InputShape::Mapping
        );
        assert_eq!(
            Task::from_input(TaskInput::from(json!("x"))).shape(),
            InputShape::Literal
        );
    }

    #[tokio::test]
    async fn test_initializer_not_run_without_subscription() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting_task(counter.clone());

        run_pending_ticks().await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(task.state(), TaskState::Pending);
    }

    #[tokio::test]
    async fn test_initializer_runs_at_most_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting_task(counter.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..3 {
            let seen = seen.clone();
            task.on_complete(move |_, value| {
                seen.lock().push(value);
                Ok(())
            });
        }
        run_pending_ticks().await;

        // subscribing again after settlement serves the cached result
        assert_eq!(task.clone().await, json!(1));
        assert_eq!(task.clone().await, json!(1));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![json!(1), json!(1), json!(1)]);
    }

    #[tokio::test]
    async fn test_on_complete_is_chainable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (first, second) = (calls.clone(), calls.clone());

        Task::literal(2)
            .on_complete(move |_, _| {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_complete(move |_, _| {
                second.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        run_pending_ticks().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delivery_is_never_synchronous() {
        let delivered = Arc::new(AtomicUsize::new(0));

        let flag = delivered.clone();
        Task::literal(1).on_complete(move |_, _| {
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        let flag = delivered.clone();
        Task::new(|_, resolver| {
            resolver.resolve(1);
            Ok(())
        })
        .on_complete(move |_, _| {
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        run_pending_ticks().await;
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_subscribers_delivered_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let task = Task::from_future(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            json!("done")
        });

        for index in 0..5 {
            let order = order.clone();
            task.on_complete(move |_, _| {
                order.lock().push(index);
                Ok(())
            });
        }
        task.clone().await;
        run_pending_ticks().await;

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let task = Task::from_future(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            json!(1)
        });
        assert_eq!(task.state(), TaskState::Pending);

        task.on_complete(|_, _| Ok(()));
        assert_eq!(task.state(), TaskState::Running);

        task.clone().await;
        assert_eq!(task.state(), TaskState::Settled);
        assert!(task.is_settled());

        // literals never transition
        let literal = Task::literal(1);
        literal.clone().await;
        assert_eq!(literal.state(), TaskState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mapping_fan_in_regardless_of_timing() {
        let slow = Task::from_future(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            json!(2)
        });
        let fast = Task::from_future(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            json!(3)
        })
        .transform(|value| Ok(json!(value.as_i64().unwrap_or_default() * 2)));

        let mapping = Task::mapping([
            ("a", Entry::from(json!(1))),
            ("b", Entry::from(slow)),
            ("c", Entry::from(fast)),
        ]);

        assert_eq!(mapping.await, json!({"a": 1, "b": 2, "c": 6}));
    }

    #[tokio::test]
    async fn test_mapping_keeps_entry_order() {
        let mapping = Task::mapping([
            ("z", Entry::from(Task::literal(1))),
            ("a", Entry::from(json!(2))),
            ("m", Entry::from(Task::literal(3))),
        ]);

        let result = mapping.await;
        let keys: Vec<&String> = result.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[tokio::test]
    async fn test_mapping_without_tasks_settles() {
        let mapping = Task::mapping([("a", Entry::from(json!(1))), ("b", Entry::from(json!(0)))]);

        assert_eq!(mapping.clone().await, json!({"a": 1, "b": 0}));
        assert!(mapping.is_settled());
    }

    #[tokio::test]
    async fn test_mapping_children_run_quiet_and_share_errors() {
        let child = Task::new(|_, _| Err(anyhow!("child failed")));
        let mapping = Task::mapping([("bad", Entry::from(&child)), ("ok", Entry::from(json!(1)))]);

        assert_eq!(mapping.clone().await, json!({"bad": null, "ok": 1}));
        assert!(child.is_silent());
        assert!(child.error_log().shares_with(mapping.error_log()));
        assert_eq!(mapping.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_mapping_reports_collected_errors_once() {
        let (sink, mut faults) = ChannelSink::new();
        let mapping = Task::mapping([
            ("a", Entry::from(Task::new(|_, _| Err(anyhow!("a failed"))))),
            ("b", Entry::from(Task::new(|_, _| Err(anyhow!("b failed"))))),
        ])
        .with_fault_sink(sink);

        mapping.clone().await;
        run_pending_ticks().await;

        let fault = faults.try_recv().unwrap();
        assert!(matches!(fault, Fault::Settlement { .. }));
        assert_eq!(fault.errors().len(), 2);
        assert!(faults.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_initializer_error_settles_with_null() {
        let (sink, mut faults) = ChannelSink::new();
        let task = Task::new(|_, _| Err(anyhow!("cannot start"))).with_fault_sink(sink);

        assert_eq!(task.clone().await, Value::Null);
        assert!(matches!(&*task.errors()[0], TaskError::Initializer(_)));

        run_pending_ticks().await;
        let fault = faults.try_recv().unwrap();
        assert_eq!(fault.task_id(), task.id());
    }

    #[tokio::test]
    async fn test_initializer_panic_is_captured() {
        let task = Task::new(|_, _| panic!("exploded")).quiet();

        assert_eq!(task.clone().await, Value::Null);
        match &*task.errors()[0] {
            TaskError::Panicked(message) => assert_eq!(message, "exploded"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_late_resolution_is_ignored() {
        let task = Task::new(|_, resolver| {
            resolver.resolve("first");
            Err(anyhow!("failed after resolving"))
        })
        .quiet();

        assert_eq!(task.clone().await, json!("first"));
        assert_eq!(task.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_try_future_captures_error() {
        let task = Task::try_future(async { Err(anyhow!("fetch failed")) }).quiet();

        assert_eq!(task.clone().await, Value::Null);
        assert_eq!(task.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_initializer_sees_its_task() {
        let task = Task::new(|task, resolver| {
            resolver.resolve(json!(task.errors().len()));
            Ok(())
        });

        assert_eq!(task.await, json!(0));
    }

    #[tokio::test]
    async fn test_subscriber_failure_reported_unless_silent() {
        let (sink, mut faults) = ChannelSink::new();
        let task = Task::literal(1).with_fault_sink(sink.clone());

        task.on_complete(|_, _| Err(anyhow!("callback failed")));
        run_pending_ticks().await;

        let fault = faults.try_recv().unwrap();
        assert!(matches!(fault, Fault::Subscriber { .. }));
        // subscriber failures are not added to the task's own log
        assert!(task.errors().is_empty());

        let quiet = Task::literal(1).with_fault_sink(sink).quiet();
        quiet.on_complete(|_, _| panic!("callback panicked"));
        run_pending_ticks().await;
        assert!(faults.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_affect_others() {
        let task = Task::literal("OK").quiet();
        let received = Arc::new(Mutex::new(None));

        task.on_complete(|_, _| Err(anyhow!("first subscriber fails")));
        let slot = received.clone();
        task.on_complete(move |_, value| {
            *slot.lock() = Some(value);
            Ok(())
        });
        run_pending_ticks().await;

        assert_eq!(*received.lock(), Some(json!("OK")));
    }

    #[tokio::test]
    async fn test_error_records_bare_messages() {
        let task = Task::empty();
        task.error("NOT OK!").error(anyhow!("wrapped"));

        let errors = task.errors();
        assert_eq!(errors.len(), 2);
        assert!(matches!(&*errors[0], TaskError::Reported(_)));
        assert_eq!(errors[0].to_string(), "NOT OK!");
        assert_eq!(errors[1].to_string(), "wrapped");
        assert_eq!(task.state(), TaskState::Pending);
    }

    #[tokio::test]
    async fn test_settled_future_is_lazy() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting_task(counter.clone());

        let pending = task.settled();
        run_pending_ticks().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(pending.await, json!(1));
    }

    #[test]
    fn test_is_task_like() {
        let task = Task::empty();
        let value = json!({"a": 1});

        assert!(is_task_like(&task));
        assert!(!is_task_like(&value));
        assert!(!is_task_like(&"task"));
        assert!(Entry::from(task).is_task());
        assert!(!Entry::from(value).is_task());
    }

    #[test]
    fn test_clones_are_the_same_task() {
        let task = Task::literal(1);
        let other = Task::literal(1);

        assert_eq!(task, task.clone());
        assert_eq!(task.id(), task.clone().id());
        assert_ne!(task, other);
    }
}
