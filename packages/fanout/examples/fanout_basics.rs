//! Subscribing to an event at different priorities, skipping and self-removal.
//!
//! Run with `RUST_LOG=fanout=trace` to see the dispatcher's diagnostics.

use fanout::{Event, EventState, Handler, Priority, Request};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Order {
    id: u32,
    total_cents: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let placed = Event::<Order>::builder().name("order_placed").build();

    // Conditions run before everything else and may cancel the whole fire.
    placed.connect(Priority::Condition, |state: &mut EventState, order: &Order| {
        if order.total_cents == 0 {
            println!("order {} is empty, ignoring", order.id);
            state.skip();
        }
    });

    // Runs exactly once, then removes itself.
    placed.add(Priority::First, |order: &Order| {
        println!("first order of the day: {}", order.id);
        Request::Remove
    });

    placed.add(10, |order: &Order| println!("reserving stock for order {}", order.id));
    placed.add(0, |order: &Order| println!("charging {} cents", order.total_cents));

    {
        let mut mailer = Handler::new(|order: &Order| {
            println!("emailing receipt for order {}", order.id);
        });
        mailer.subscribe(&placed, Priority::Last);

        placed.fire(Order {
            id: 1,
            total_cents: 1999,
        });
        placed.fire(Order {
            id: 2,
            total_cents: 0,
        });

        // The mailer goes out of scope here and unsubscribes itself.
    }

    placed.fire(Order {
        id: 3,
        total_cents: 500,
    });

    println!("{} subscribers left", placed.len());
}
