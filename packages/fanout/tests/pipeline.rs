//! Buffering and forwarding scenarios built from queues, chains and links.

use std::sync::Arc;

use fanout::{Chain, Event, EventState, Handler, Manager, Priority, Queue};
use testing::CallLog;

#[derive(Clone, Debug)]
struct Reading {
    sensor: &'static str,
    celsius: i32,
}

#[derive(Debug)]
struct Alert(String);

impl From<Reading> for Alert {
    fn from(reading: Reading) -> Self {
        Self(format!("{} at {}C", reading.sensor, reading.celsius))
    }
}

#[test]
fn queue_batches_readings_for_periodic_processing() {
    let readings = Event::<Reading>::new();
    let queue = Queue::<Reading>::new();
    queue.subscribe_to(&readings, 0);
    queue.add_condition(|reading: &Reading| reading.celsius > -100);

    let log = CallLog::new();
    let entry = log.clone();
    let mut display = Handler::new(move |reading: &Reading| {
        entry.record(format!("{}={}", reading.sensor, reading.celsius));
    });
    display.subscribe(&queue, 0);

    readings.fire(Reading { sensor: "a", celsius: 20 });
    readings.fire(Reading { sensor: "b", celsius: -273 });
    readings.fire(Reading { sensor: "c", celsius: 25 });

    assert!(log.is_empty());

    assert_eq!(queue.process(2), 2);
    assert_eq!(log.entries(), ["a=20"]);

    assert_eq!(queue.process(0), 1);
    assert_eq!(log.entries(), ["a=20", "c=25"]);
}

#[test]
fn chain_converts_readings_into_alerts() {
    let readings = Event::<Reading>::new();
    let alerts = Chain::<Alert>::new();
    let log = CallLog::new();

    // Only hot readings should reach the alert chain.
    readings.connect(Priority::Condition, |state: &mut EventState, reading: &Reading| {
        if reading.celsius < 50 {
            state.skip();
        }
    });
    alerts.follow(&readings);

    let entry = log.clone();
    alerts.event().add(0, move |alert: &Alert| entry.record(alert.0.clone()));

    readings.fire(Reading { sensor: "boiler", celsius: 90 });
    readings.fire(Reading { sensor: "office", celsius: 21 });

    assert_eq!(log.entries(), ["boiler at 90C"]);
}

#[test]
fn managed_chain_source_defers_whole_pipeline() {
    let manager = Arc::new(Manager::new());
    let source = Event::<u32>::with_manager(&manager);
    let stage = Chain::<u64>::new();
    let log = CallLog::new();

    stage.follow(&source);

    let entry = log.clone();
    stage.event().add(0, move |value: &u64| entry.record(value.to_string()));

    source.fire(1);
    source.fire(2);
    assert!(log.is_empty());

    assert_eq!(manager.run_all(), 2);
    assert_eq!(log.entries(), ["1", "2"]);
}

#[test]
fn queue_feeds_chain_feeds_handler() {
    let queue = Queue::<u8>::new();
    let widened = Chain::<u32>::new();
    widened.follow(&queue);

    let log = CallLog::new();
    let entry = log.clone();
    let mut handler = Handler::new(move |value: &u32| entry.record(format!("{value}")));
    handler.subscribe(&widened, 0);

    for value in [3, 1, 2] {
        queue.push(value);
    }
    queue.process(0);

    assert_eq!(log.entries(), ["3", "1", "2"]);

    drop(widened);
    queue.push(4);
    queue.process(0);

    assert_eq!(log.len(), 3);
    assert!(queue.event().is_empty());
}
