mod test_utils;

use ponydb::TriggerEvent;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_utils::{connect_with_trigger_emitter, emit_trigger_event, Outcome};

#[test]
fn subscribed_callback_receives_matching_events() {
    let (connection, transport, server) =
        connect_with_trigger_emitter(|_fake, _sql, _params| Outcome::Affected(0));

    let received: Arc<Mutex<Vec<TriggerEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    connection
        .subscribe_trigger(
            "orders_changed",
            Box::new(move |event| sink.lock().unwrap().push(event.clone())),
        )
        .unwrap();

    emit_trigger_event(&transport, "orders_changed", "etl_job", 3);

    let mut waited = Duration::ZERO;
    while received.lock().unwrap().is_empty() && waited < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(20));
        waited += Duration::from_millis(20);
    }

    let events = received.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "orders_changed");
    assert_eq!(events[0].source, "etl_job");
    assert_eq!(events[0].fire_count, 3);
    drop(events);

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn unsubscribed_trigger_name_receives_nothing() {
    let (connection, transport, server) =
        connect_with_trigger_emitter(|_fake, _sql, _params| Outcome::Affected(0));

    let received: Arc<Mutex<Vec<TriggerEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    connection
        .subscribe_trigger(
            "orders_changed",
            Box::new(move |event| sink.lock().unwrap().push(event.clone())),
        )
        .unwrap();
    connection.unsubscribe_trigger("orders_changed").unwrap();

    emit_trigger_event(&transport, "orders_changed", "etl_job", 1);

    // give the dispatch thread a chance to process the event before asserting
    // nothing arrived
    std::thread::sleep(Duration::from_millis(200));
    assert!(received.lock().unwrap().is_empty());

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn a_panicking_callback_does_not_stop_other_subscribers() {
    let (connection, transport, server) =
        connect_with_trigger_emitter(|_fake, _sql, _params| Outcome::Affected(0));

    let received: Arc<Mutex<Vec<TriggerEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    connection
        .subscribe_trigger(
            "orders_changed",
            Box::new(|_event| panic!("broken subscriber")),
        )
        .unwrap();
    connection
        .subscribe_trigger(
            "orders_changed",
            Box::new(move |event| sink.lock().unwrap().push(event.clone())),
        )
        .unwrap();

    emit_trigger_event(&transport, "orders_changed", "etl_job", 7);

    let mut waited = Duration::ZERO;
    while received.lock().unwrap().is_empty() && waited < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(20));
        waited += Duration::from_millis(20);
    }

    assert_eq!(received.lock().unwrap().len(), 1);
    assert!(!connection.is_closed());

    connection.close().unwrap();
    server.join().unwrap();
}

#[test]
fn server_ping_events_do_not_trigger_any_callback() {
    let (connection, transport, server) =
        connect_with_trigger_emitter(|_fake, _sql, _params| Outcome::Affected(0));

    let received: Arc<Mutex<Vec<TriggerEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    connection
        .subscribe_trigger(
            "orders_changed",
            Box::new(move |event| sink.lock().unwrap().push(event.clone())),
        )
        .unwrap();

    test_utils::emit_ping_event(&transport);
    std::thread::sleep(Duration::from_millis(200));
    assert!(received.lock().unwrap().is_empty());

    connection.close().unwrap();
    server.join().unwrap();
}
