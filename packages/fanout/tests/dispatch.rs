//! End-to-end dispatch scenarios that combine events, handlers and managers the way an
//! application would.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use fanout::{Event, EventState, Handler, Invalidator, Manager, Priority, Request};
use testing::{CallLog, with_watchdog};

#[test]
fn numbered_priorities_follow_documented_order() {
    let event = Event::<()>::new();
    let log = CallLog::new();

    for (label, priority) in [("5a", 5), ("5b", 5), ("0", 0), ("-3", -3), ("10", 10)] {
        let entry = log.clone();
        event.add(priority, move |_: &()| entry.record(label));
    }

    event.fire(());

    assert_eq!(log.entries(), ["10", "5a", "5b", "0", "-3"]);
}

#[test]
fn negative_bucket_runs_latest_first_within_a_number() {
    let event = Event::<()>::new();
    let log = CallLog::new();

    for label in ["-1a", "-1b"] {
        let entry = log.clone();
        event.add(-1, move |_: &()| entry.record(label));
    }

    let entry = log.clone();
    event.add(-2, move |_: &()| entry.record("-2"));

    event.fire(());

    assert_eq!(log.entries(), ["-1b", "-1a", "-2"]);
}

#[test]
fn guard_object_controls_subscription_lifetime() {
    struct Session {
        _subscription: Invalidator,
    }

    let event = Event::<u32>::new();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let session = Session {
        _subscription: Invalidator::new(&event.add(0, move |_: &u32| {
            counter.fetch_add(1, Ordering::Relaxed);
        })),
    };

    event.fire(1);
    drop(session);
    event.fire(2);

    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert!(event.is_empty());
}

#[test]
fn one_shot_callback_with_remove() {
    let event = Event::<&'static str>::new();
    let log = CallLog::new();

    let entry = log.clone();
    event.add(Priority::First, move |message: &&str| {
        entry.record(format!("once {message}"));
        Request::Remove
    });

    let entry = log.clone();
    event.add(0, move |message: &&str| entry.record(format!("always {message}")));

    event.fire("a");
    event.fire("b");

    assert_eq!(log.entries(), ["once a", "always a", "always b"]);
    assert_eq!(event.len(), 1);
}

#[test]
fn worker_threads_hand_fires_to_main_loop() {
    with_watchdog(|| {
        let manager = Arc::new(Manager::new());
        let completed = Event::<(usize, u32)>::builder()
            .name("job_completed")
            .manager(&manager)
            .build();

        let main_thread = thread::current().id();
        let results = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&results);
        completed.add(0, move |(worker, value): &(usize, u32)| {
            assert_eq!(thread::current().id(), main_thread);
            sink.lock().unwrap().push((*worker, *value));
        });

        thread::scope(|s| {
            for worker in 0..3 {
                let completed = &completed;
                s.spawn(move || {
                    for value in 0..10 {
                        completed.fire((worker, value));
                    }
                });
            }
        });

        assert!(results.lock().unwrap().is_empty());
        assert_eq!(manager.run(), 30);

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 30);

        // Each worker's fires keep their relative order.
        for worker in 0..3 {
            let values: Vec<u32> = results
                .iter()
                .filter(|(from, _)| *from == worker)
                .map(|(_, value)| *value)
                .collect();

            assert_eq!(values, (0..10).collect::<Vec<_>>());
        }
    });
}

#[test]
fn cascading_fires_through_handlers() {
    let requested = Arc::new(Event::<u32>::new());
    let approved = Arc::new(Event::<u32>::new());
    let log = CallLog::new();

    let next = Arc::downgrade(&approved);
    let mut reviewer = Handler::with_state(move |state: &mut EventState, amount: &u32| {
        if *amount > 1000 {
            state.skip();
            return;
        }

        next.upgrade().unwrap().fire(*amount);
    });
    reviewer.subscribe(&requested, Priority::First);

    let entry = log.clone();
    let mut auditor = Handler::new(move |amount: &u32| entry.record(format!("requested {amount}")));
    auditor.subscribe(&requested, 0);

    let entry = log.clone();
    let mut payer = Handler::new(move |amount: &u32| entry.record(format!("paid {amount}")));
    payer.subscribe(&approved, 0);

    requested.fire(50);
    requested.fire(5000);

    assert_eq!(log.entries(), ["paid 50", "requested 50"]);
}

#[test]
fn subscriber_added_by_another_thread_mid_fire_waits_for_next_fire() {
    with_watchdog(|| {
        let event = Arc::new(Event::<u32>::new());
        let log = CallLog::new();

        let adder = Arc::downgrade(&event);
        let entry = log.clone();
        event.add(0, move |value: &u32| {
            entry.record(format!("first {value}"));

            if *value == 1 {
                let event = adder.upgrade().unwrap();
                let entry = entry.clone();

                thread::scope(|s| {
                    s.spawn(|| {
                        event.add(0, move |value: &u32| entry.record(format!("second {value}")));
                    });
                });
            }
        });

        event.fire(1);
        event.fire(2);

        assert_eq!(log.entries(), ["first 1", "first 2", "second 2"]);
    });
}
