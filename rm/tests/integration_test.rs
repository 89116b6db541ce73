//! Integration tests for the recurrence machine
//!
//! These tests verify end-to-end behavior across the machine, the registry,
//! and the work queue, under tokio's virtual clock.

use std::sync::Arc;
use std::time::Duration;

use recurrence::{
    Executor, FnTask, RecurrenceConfig, RecurrenceError, RecurrenceMachine, RecurringTask,
    RegistryEvent, TaskInstance, WorkQueue,
};
use tokio::sync::{Mutex, Semaphore};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(interval_secs: u64) -> RecurrenceConfig {
    RecurrenceConfig {
        interval_secs,
        ..Default::default()
    }
}

fn recording(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn RecurringTask> {
    Arc::new(FnTask::new(name, move || {
        let log = log.clone();
        async move {
            log.lock().await.push(name);
        }
    }))
}

async fn settle() {
    for _ in 0..25 {
        tokio::task::yield_now().await;
    }
}

async fn advance(secs: u64) {
    // Let any freshly-spawned timer task poll to its `sleep` and register a
    // deadline with the paused clock *before* we jump virtual time; otherwise
    // the clock advances past an unregistered deadline.
    settle().await;
    tokio::time::advance(Duration::from_secs(secs)).await;
    settle().await;
}

// =============================================================================
// Recurrence lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_machine_cycles_repeatedly_on_its_own_queue() {
    init_logging();
    let machine = RecurrenceMachine::new(config(1)).expect("valid config");
    let log = Arc::new(Mutex::new(Vec::new()));

    machine.add_recurring_task(recording("sync", log.clone())).await;
    machine.add_recurring_task(recording("purge", log.clone())).await;

    for _ in 0..3 {
        advance(1).await;
    }

    assert_eq!(
        *log.lock().await,
        vec!["sync", "purge", "sync", "purge", "sync", "purge"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_work_delays_but_never_drops_recurrence() {
    init_logging();
    let machine = RecurrenceMachine::new(config(1)).expect("valid config");
    let log = Arc::new(Mutex::new(Vec::new()));

    // The task takes three intervals to finish, so every other probe finds
    // the queue busy and skips
    let slow_log = log.clone();
    machine
        .add_recurring_task(Arc::new(FnTask::new("slow", move || {
            let log = slow_log.clone();
            async move {
                log.lock().await.push("start");
                tokio::time::sleep(Duration::from_secs(3)).await;
                log.lock().await.push("done");
            }
        })))
        .await;

    advance(1).await; // cycle 1 starts
    advance(1).await; // busy probe
    advance(1).await; // busy probe
    advance(1).await; // work done at t=4; probe finds idle, cycle 2 starts
    advance(1).await;

    let entries = log.lock().await.clone();
    assert_eq!(entries[0], "start");
    assert_eq!(entries[1], "done");
    assert_eq!(entries[2], "start");
}

// =============================================================================
// Postponement
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_postponement_suspends_and_resumes_across_handles() {
    init_logging();
    let machine = RecurrenceMachine::new(config(2)).expect("valid config");
    let log = Arc::new(Mutex::new(Vec::new()));
    machine.add_recurring_task(recording("beat", log.clone())).await;

    let controller = machine.clone();
    controller.begin_postponing_operations().await;

    advance(20).await;
    assert!(log.lock().await.is_empty());

    controller.end_postponing_operations().await.expect("balanced end");

    // One full interval after the end, not sooner
    advance(1).await;
    assert!(log.lock().await.is_empty());
    advance(1).await;
    assert_eq!(*log.lock().await, vec!["beat"]);
}

#[tokio::test(start_paused = true)]
async fn test_end_without_begin_is_surfaced() {
    init_logging();
    let machine = RecurrenceMachine::new(config(1)).expect("valid config");
    assert!(matches!(
        machine.end_postponing_operations().await,
        Err(RecurrenceError::NotPostponed)
    ));
}

// =============================================================================
// Bracketed external work
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_bracket_suppresses_recurrence_for_its_whole_span() {
    init_logging();
    let queue = Arc::new(WorkQueue::new());
    let machine = RecurrenceMachine::with_queue(config(1), queue.clone()).expect("valid config");
    let log = Arc::new(Mutex::new(Vec::new()));
    machine.add_recurring_task(recording("cycle", log.clone())).await;

    let gate = Arc::new(Semaphore::new(0));
    let wait_gate = gate.clone();
    let suffix = machine
        .submit_bracketed(TaskInstance::new("external-work", async move {
            let _permit = wait_gate.acquire().await;
        }))
        .await;
    settle().await;

    // Several intervals elapse while the bracket is open; the machine is
    // postponed the whole time
    advance(5).await;
    assert!(machine.is_postponing_operations().await);
    assert!(log.lock().await.is_empty());

    gate.add_permits(1);
    suffix.wait().await;
    assert!(!machine.is_postponing_operations().await);

    // Recurrence resumes one full interval after the bracket closes
    advance(1).await;
    assert_eq!(*log.lock().await, vec!["cycle"]);
}

#[tokio::test(start_paused = true)]
async fn test_manually_wired_bracket_matches_the_helper() {
    init_logging();
    let queue = Arc::new(WorkQueue::new());
    let machine = RecurrenceMachine::with_queue(config(30), queue.clone()).expect("valid config");

    let order = Arc::new(Mutex::new(Vec::new()));
    let work_order = order.clone();

    let prefix = queue.submit(machine.postponing_wrapper_prefix()).await;
    let work = queue
        .submit_after(
            TaskInstance::new("payload", async move {
                work_order.lock().await.push("payload");
            }),
            &prefix,
        )
        .await;
    let suffix = queue
        .submit_after(machine.postponing_wrapper_suffix(), &work)
        .await;

    suffix.wait().await;
    assert_eq!(*order.lock().await, vec!["payload"]);
    assert!(!machine.is_postponing_operations().await);
    assert_eq!(machine.postponing_request_count().await, 0);
}

// =============================================================================
// Immediate scheduling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_schedule_now_bypasses_the_wait() {
    init_logging();
    let machine = RecurrenceMachine::new(config(300)).expect("valid config");
    let log = Arc::new(Mutex::new(Vec::new()));
    machine.add_recurring_task(recording("refresh", log.clone())).await;

    assert!(machine.schedule_operations_now().await);
    settle().await;
    assert_eq!(*log.lock().await, vec!["refresh"]);
}

#[tokio::test(start_paused = true)]
async fn test_schedule_now_reports_busy_via_bool_not_error() {
    init_logging();
    let queue = Arc::new(WorkQueue::new());
    let machine = RecurrenceMachine::with_queue(config(30), queue.clone()).expect("valid config");

    let gate = Arc::new(Semaphore::new(0));
    let wait_gate = gate.clone();
    queue
        .submit(TaskInstance::new("outstanding", async move {
            let _permit = wait_gate.acquire().await;
        }))
        .await;
    settle().await;

    assert!(!machine.schedule_operations_now().await);

    gate.add_permits(1);
    queue.wait_idle().await;
    assert!(machine.schedule_operations_now().await);
}

// =============================================================================
// Registry observation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_registry_events_are_observable_while_running() {
    init_logging();
    let machine = RecurrenceMachine::new(config(30)).expect("valid config");
    let mut events = machine.registry().subscribe();

    machine
        .add_recurring_task(Arc::new(FnTask::new("one", || async {})))
        .await;
    machine
        .add_recurring_task(Arc::new(FnTask::new("two", || async {})))
        .await;
    machine.registry().remove(0).await.expect("index in range");

    assert!(matches!(
        events.recv().await.unwrap(),
        RegistryEvent::Added { index: 0, ref name } if name == "one"
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        RegistryEvent::Added { index: 1, ref name } if name == "two"
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        RegistryEvent::Removed { index: 0, ref name } if name == "one"
    ));

    let remaining = machine.recurring_tasks().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name(), "two");
}

// =============================================================================
// Executor contract seen by the machine
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_machine_only_probes_idleness_of_its_own_queue() {
    init_logging();
    // Two machines on two queues must not interfere
    let log_a = Arc::new(Mutex::new(Vec::new()));
    let log_b = Arc::new(Mutex::new(Vec::new()));

    let queue_a = Arc::new(WorkQueue::new());
    let queue_b = Arc::new(WorkQueue::new());
    let machine_a = RecurrenceMachine::with_queue(config(1), queue_a.clone()).expect("valid config");
    let machine_b = RecurrenceMachine::with_queue(config(1), queue_b).expect("valid config");

    machine_a.add_recurring_task(recording("a", log_a.clone())).await;
    machine_b.add_recurring_task(recording("b", log_b.clone())).await;

    // Park work on queue A only
    let gate = Arc::new(Semaphore::new(0));
    let wait_gate = gate.clone();
    queue_a
        .submit(TaskInstance::new("parked", async move {
            let _permit = wait_gate.acquire().await;
        }))
        .await;
    settle().await;

    advance(1).await;
    assert!(log_a.lock().await.is_empty());
    assert_eq!(*log_b.lock().await, vec!["b"]);

    gate.add_permits(1);
    settle().await;
    advance(1).await;
    assert_eq!(*log_a.lock().await, vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_queue_is_reachable_through_the_machine() {
    init_logging();
    let machine = RecurrenceMachine::new(config(30)).expect("valid config");

    let done = Arc::new(Mutex::new(false));
    let flag = done.clone();
    let ticket = machine
        .queue()
        .submit(TaskInstance::new("direct", async move {
            *flag.lock().await = true;
        }))
        .await;

    ticket.wait().await;
    assert!(*done.lock().await);
}
