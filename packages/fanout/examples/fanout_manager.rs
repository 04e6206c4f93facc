//! Worker threads raising events that are handled on the main thread, once per loop iteration.
//!
//! Run with `RUST_LOG=fanout=debug` to see the manager's drain summaries.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fanout::{Chain, Event, Manager};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let manager = Arc::new(Manager::new());

    let downloaded = Event::<(usize, u32)>::builder()
        .name("chunk_downloaded")
        .manager(&manager)
        .build();

    let progress = Chain::<(usize, u32)>::new();
    progress.follow(&downloaded);

    let main_thread = thread::current().id();
    progress.event().add(0, move |(worker, chunk): &(usize, u32)| {
        assert_eq!(thread::current().id(), main_thread);
        println!("worker {worker} finished chunk {chunk}");
    });

    thread::scope(|s| {
        for worker in 0..3 {
            let downloaded = &downloaded;
            s.spawn(move || {
                for chunk in 0..4 {
                    thread::sleep(Duration::from_millis(5));
                    downloaded.fire((worker, chunk));
                }
            });
        }

        // The main loop: handle whatever has arrived, with a time budget per iteration.
        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(200) {
            let handled = manager.run_until(Instant::now() + Duration::from_millis(2));

            if handled > 0 {
                println!("handled {handled} events this iteration");
            }

            thread::sleep(Duration::from_millis(10));
        }
    });

    let leftover = manager.run();
    println!("handled {leftover} leftover events");
}
