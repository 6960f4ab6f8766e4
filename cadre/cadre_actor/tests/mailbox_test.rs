//! Integration tests for message delivery.
//!
//! These tests drive actors through a full actor system and check the
//! concurrency and ordering guarantees of the mailbox and dispatcher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cadre_actor::{
    Actor, ActorContext, ActorSystem, Envelope, LifecycleState, Props, SyncContext,
};
use cadre_core::{ActorError, Config};
use crossbeam_channel::{unbounded, Sender};

/// Forwards every `u32` it receives to a channel.
struct Collector {
    out: Sender<u32>,
}

impl Actor for Collector {
    fn receive(&mut self, _ctx: &mut ActorContext<'_>, envelope: &Envelope) -> Result<(), ActorError> {
        if let Some(n) = envelope.downcast_ref::<u32>() {
            let _ = self.out.send(*n);
        }
        Ok(())
    }
}

fn collector(out: Sender<u32>) -> Props {
    Props::from_fn(move || Collector { out: out.clone() })
}

/// Records `label:n` into a shared log.
struct Logger {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Actor for Logger {
    fn receive(&mut self, _ctx: &mut ActorContext<'_>, envelope: &Envelope) -> Result<(), ActorError> {
        if let Some(n) = envelope.downcast_ref::<u32>() {
            self.log.lock().unwrap().push(format!("{}{}", self.label, n));
        }
        Ok(())
    }
}

/// A system whose default dispatcher runs on `context`.
fn synchronized_system(context: &SyncContext, extra: &[(&str, &str)]) -> ActorSystem {
    let mut config = Config::new();
    config
        .set("actor.default-dispatcher.type", "SynchronizedDispatcher")
        .unwrap();
    for (key, value) in extra {
        config.set(key, *value).unwrap();
    }
    ActorSystem::builder("sync")
        .config(config)
        .sync_context(context.clone())
        .build()
        .unwrap()
}

#[test]
fn test_handler_never_runs_concurrently() {
    let mut config = Config::new();
    config.set("actor.default-dispatcher.threads", 4).unwrap();
    config.set("actor.default-dispatcher.throughput", 3).unwrap();
    let system = ActorSystem::with_config("concurrency", &config).unwrap();

    struct Reentrancy {
        active: Arc<AtomicUsize>,
        violations: Arc<AtomicUsize>,
        processed: Arc<AtomicUsize>,
    }

    impl Actor for Reentrancy {
        fn receive(&mut self, _ctx: &mut ActorContext<'_>, _envelope: &Envelope) -> Result<(), ActorError> {
            if self.active.fetch_add(1, Ordering::SeqCst) != 0 {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            thread::yield_now();
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.processed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let active = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let processed = Arc::new(AtomicUsize::new(0));
    let props = {
        let (active, violations, processed) =
            (active.clone(), violations.clone(), processed.clone());
        Props::from_fn(move || Reentrancy {
            active: active.clone(),
            violations: violations.clone(),
            processed: processed.clone(),
        })
    };
    let actor = system.spawn(props, "reentrancy").unwrap();

    let producers: Vec<_> = (0..8)
        .map(|_| {
            let actor = actor.clone();
            thread::spawn(move || {
                for n in 0..500u32 {
                    actor.tell(n, None);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while processed.load(Ordering::SeqCst) < 4000 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(processed.load(Ordering::SeqCst), 4000);
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(system.shutdown());
}

#[test]
fn test_fifo_order_from_one_sender() {
    let system = ActorSystem::new("fifo").unwrap();
    let (tx, rx) = unbounded();
    let actor = system.spawn(collector(tx), "fifo").unwrap();

    for n in 1..=100u32 {
        actor.tell(n, None);
    }

    let received: Vec<u32> = (0..100)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert_eq!(received, (1..=100).collect::<Vec<_>>());
    assert!(system.shutdown());
}

#[test]
fn test_stack_mailbox_processes_newest_first() {
    let context = SyncContext::capture("lifo");
    let system = synchronized_system(
        &context,
        &[("actor.mailboxes.latest.mailbox-type", "stack")],
    );
    let (tx, rx) = unbounded();
    let actor = system
        .spawn(collector(tx).with_mailbox("latest"), "lifo")
        .unwrap();
    context.run_pending().unwrap();

    for n in 1..=100u32 {
        actor.tell(n, None);
    }
    context.run_pending().unwrap();

    let received: Vec<u32> = rx.try_iter().collect();
    assert_eq!(received, (1..=100).rev().collect::<Vec<_>>());
}

#[test]
fn test_stop_preempts_queued_user_message() {
    let context = SyncContext::capture("priority");
    let system = synchronized_system(&context, &[]);
    let dead = system.dead_letters().subscribe();
    let (tx, rx) = unbounded();
    let actor = system.spawn(collector(tx), "priority").unwrap();
    context.run_pending().unwrap();

    actor.tell(1u32, None);
    actor.stop();
    context.run_pending().unwrap();

    assert!(actor.is_terminated());
    assert!(rx.try_recv().is_err());

    let letter = dead.try_recv().unwrap();
    assert_eq!(letter.recipient, actor.id());
    assert_eq!(letter.message_type, "u32");
    assert_eq!(system.dead_letters().count(), 1);
}

#[test]
fn test_throughput_interleaves_mailboxes() {
    let context = SyncContext::capture("fairness");
    let system = synchronized_system(&context, &[]);
    let log = Arc::new(Mutex::new(Vec::new()));

    let spawn = |label: &'static str| {
        let log = log.clone();
        system
            .spawn(
                Props::from_fn(move || Logger {
                    label,
                    log: log.clone(),
                }),
                label,
            )
            .unwrap()
    };
    let a = spawn("A");
    let b = spawn("B");
    context.run_pending().unwrap();

    for n in 1..=12u32 {
        a.tell(n, None);
    }
    b.tell(1u32, None);
    context.run_pending().unwrap();

    let expected: Vec<String> = ["A1", "A2", "A3", "A4", "A5", "B1", "A6", "A7", "A8", "A9", "A10", "A11", "A12"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(*log.lock().unwrap(), expected);
}

#[test]
fn test_full_bounded_mailbox_sends_to_dead_letters() {
    let context = SyncContext::capture("bounded");
    let mut config = Config::new();
    config
        .set("actor.default-dispatcher.type", "SynchronizedDispatcher")
        .unwrap();
    config
        .set("actor.mailboxes.small.mailbox-type", "bounded")
        .unwrap();
    config.set("actor.mailboxes.small.mailbox-capacity", 2).unwrap();
    let system = ActorSystem::builder("bounded")
        .config(config)
        .sync_context(context.clone())
        .build()
        .unwrap();
    let dead = system.dead_letters().subscribe();

    let (tx, rx) = unbounded();
    let actor = system
        .spawn(collector(tx).with_mailbox("small"), "small")
        .unwrap();
    context.run_pending().unwrap();

    for n in 1..=3u32 {
        actor.tell(n, None);
    }
    assert_eq!(system.dead_letters().count(), 1);
    assert_eq!(dead.try_recv().unwrap().recipient, actor.id());

    context.run_pending().unwrap();
    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn test_throughput_deadline_bounds_a_run() {
    let context = SyncContext::capture("deadline");
    let system = synchronized_system(
        &context,
        &[("actor.default-dispatcher.throughput-deadline-time", "0ms")],
    );
    let log = Arc::new(Mutex::new(Vec::new()));
    let logger = |label: &'static str| {
        let log = log.clone();
        Props::from_fn(move || Logger {
            label,
            log: log.clone(),
        })
    };
    let a = system.spawn(logger("A"), "A").unwrap();
    let b = system.spawn(logger("B"), "B").unwrap();
    context.run_pending().unwrap();

    a.tell(1u32, None);
    a.tell(2u32, None);
    b.tell(1u32, None);
    context.run_pending().unwrap();

    // An elapsed deadline still lets each run handle one message
    assert_eq!(*log.lock().unwrap(), vec!["A1", "B1", "A2"]);
}

#[test]
fn test_oversized_durations_do_not_wedge_actors() {
    let mut config = Config::new();
    config
        .set(
            "actor.default-dispatcher.throughput-deadline-time",
            "18446744073709551615s",
        )
        .unwrap();
    config
        .set("actor.shutdown-timeout", "18446744073709551615s")
        .unwrap();
    let system = ActorSystem::with_config("far-future", &config).unwrap();

    let (tx, rx) = unbounded();
    let actor = system.spawn(collector(tx), "collector").unwrap();

    actor.tell(1u32, None);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    actor.tell(2u32, None);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
    assert_eq!(actor.lifecycle(), LifecycleState::Started);
    assert!(system.shutdown());
}
