#![forbid(unsafe_code)]

//! Callbacks that mutate the event they are being invoked from.
//!
//! Every scenario here runs the mutation on the triggering thread, through
//! the re-entrant lock, while the trigger walk is in progress.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use signet_core::{Event, Handle};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn take(log: &Log) -> Vec<&'static str> {
    std::mem::take(&mut *log.lock().unwrap())
}

fn tagged(log: &Log, tag: &'static str) -> impl Fn(&()) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |_| log.lock().unwrap().push(tag)
}

#[test]
fn self_disconnect_during_trigger() {
    let event = Event::<()>::new();
    let out = log();

    let _older = event.connect(tagged(&out, "older"));

    let own: Arc<Mutex<Handle>> = Arc::new(Mutex::new(Handle::empty()));
    let own_cb = Arc::clone(&own);
    let out_cb = Arc::clone(&out);
    let handle = event.connect(move |_| {
        out_cb.lock().unwrap().push("self");
        own_cb.lock().unwrap().disconnect();
    });
    *own.lock().unwrap() = handle;

    let _newer = event.connect(tagged(&out, "newer"));

    event.trigger(&());
    assert_eq!(take(&out), vec!["newer", "self", "older"]);
    assert_eq!(event.len(), 2);

    event.trigger(&());
    assert_eq!(take(&out), vec!["newer", "older"]);
    assert!(!own.lock().unwrap().is_connected());
}

#[test]
fn connect_during_trigger_fires_next_time() {
    let event = Arc::new(Event::<()>::new());
    let out = log();
    let added: Arc<Mutex<Vec<Handle>>> = Arc::new(Mutex::new(Vec::new()));
    let once = Arc::new(AtomicBool::new(false));

    let _tail = event.connect(tagged(&out, "tail"));

    let event_cb = Arc::downgrade(&event);
    let out_cb = Arc::clone(&out);
    let added_cb = Arc::clone(&added);
    let _spawner = event.connect(move |_| {
        out_cb.lock().unwrap().push("spawner");
        if once.swap(true, Ordering::Relaxed) {
            return;
        }
        if let Some(event) = event_cb.upgrade() {
            let handle = event.connect(tagged(&out_cb, "spawned"));
            added_cb.lock().unwrap().push(handle);
        }
    });

    event.trigger(&());
    assert_eq!(take(&out), vec!["spawner", "tail"]);
    assert_eq!(event.len(), 3);

    event.trigger(&());
    assert_eq!(take(&out), vec!["spawned", "spawner", "tail"]);
}

#[test]
fn disconnect_unvisited_neighbour_and_recycle_its_slot() {
    let event = Arc::new(Event::<()>::new());
    let out = log();

    let victim: Arc<Mutex<Handle>> = Arc::new(Mutex::new(Handle::empty()));
    *victim.lock().unwrap() = event.connect(tagged(&out, "victim"));

    let spawned: Arc<Mutex<Vec<Handle>>> = Arc::new(Mutex::new(Vec::new()));
    let once = Arc::new(AtomicBool::new(false));
    let event_cb = Arc::downgrade(&event);
    let victim_cb = Arc::clone(&victim);
    let spawned_cb = Arc::clone(&spawned);
    let out_cb = Arc::clone(&out);
    let _killer = event.connect(move |_| {
        out_cb.lock().unwrap().push("killer");
        if once.swap(true, Ordering::Relaxed) {
            return;
        }
        victim_cb.lock().unwrap().disconnect();
        // Reuses the victim's record; must not be visited by this walk.
        if let Some(event) = event_cb.upgrade() {
            spawned_cb
                .lock()
                .unwrap()
                .push(event.connect(tagged(&out_cb, "reborn")));
        }
    });

    event.trigger(&());
    assert_eq!(take(&out), vec!["killer"]);

    let stats = event.stats();
    assert_eq!(stats.allocated, 2);
    assert_eq!(stats.live, 2);

    event.trigger(&());
    assert_eq!(take(&out), vec!["reborn", "killer"]);
}

#[test]
fn disconnect_visited_neighbour_does_not_disturb_walk() {
    let event = Event::<()>::new();
    let out = log();

    let _first = event.connect(tagged(&out, "first"));

    let visited: Arc<Mutex<Handle>> = Arc::new(Mutex::new(Handle::empty()));
    let visited_cb = Arc::clone(&visited);
    let out_cb = Arc::clone(&out);
    let _middle = event.connect(move |_| {
        out_cb.lock().unwrap().push("middle");
        visited_cb.lock().unwrap().disconnect();
    });

    *visited.lock().unwrap() = event.connect(tagged(&out, "head"));

    event.trigger(&());
    assert_eq!(take(&out), vec!["head", "middle", "first"]);

    event.trigger(&());
    assert_eq!(take(&out), vec!["middle", "first"]);
}

#[test]
fn clear_from_callback_stops_the_walk() {
    let event = Arc::new(Event::<()>::new());
    let out = log();

    let _a = event.connect(tagged(&out, "a"));
    let _b = event.connect(tagged(&out, "b"));

    let event_cb = Arc::downgrade(&event);
    let out_cb = Arc::clone(&out);
    drop(event.connect(move |_| {
        out_cb.lock().unwrap().push("clearer");
        if let Some(event) = event_cb.upgrade() {
            event.clear();
        }
    }));

    event.trigger(&());
    assert_eq!(take(&out), vec!["clearer"]);
    assert!(event.is_empty());

    event.trigger(&());
    assert!(take(&out).is_empty());
}

#[test]
fn nested_trigger_walks_independently() {
    let event = Arc::new(Event::<()>::new());
    let out = log();
    let depth = Arc::new(AtomicUsize::new(0));

    let _older = event.connect(tagged(&out, "older"));

    let event_cb = Arc::downgrade(&event);
    let out_cb = Arc::clone(&out);
    let depth_cb = Arc::clone(&depth);
    let _retrigger = event.connect(move |_| {
        out_cb.lock().unwrap().push("retrigger");
        if depth_cb.fetch_add(1, Ordering::Relaxed) == 0 {
            if let Some(event) = event_cb.upgrade() {
                event.trigger(&());
            }
        }
    });

    event.trigger(&());
    assert_eq!(take(&out), vec!["retrigger", "retrigger", "older", "older"]);
}

#[test]
fn nested_trigger_sees_disconnect_from_inner_walk() {
    let event = Arc::new(Event::<()>::new());
    let out = log();

    let doomed: Arc<Mutex<Handle>> = Arc::new(Mutex::new(Handle::empty()));
    *doomed.lock().unwrap() = event.connect(tagged(&out, "doomed"));

    let entered = Arc::new(AtomicBool::new(false));
    let event_cb = Arc::downgrade(&event);
    let doomed_cb = Arc::clone(&doomed);
    let out_cb = Arc::clone(&out);
    let _outer = event.connect(move |_| {
        if entered.swap(true, Ordering::Relaxed) {
            // Inner walk: kill the record the outer walk will visit next.
            out_cb.lock().unwrap().push("inner");
            doomed_cb.lock().unwrap().disconnect();
            return;
        }
        out_cb.lock().unwrap().push("outer");
        if let Some(event) = event_cb.upgrade() {
            event.trigger(&());
        }
    });

    event.trigger(&());
    assert_eq!(take(&out), vec!["outer", "inner"]);
    assert_eq!(event.len(), 1);
}

#[test]
fn panicking_callback_leaves_event_usable() {
    let event = Event::<()>::new();
    let out = log();
    let armed = Arc::new(AtomicBool::new(true));

    let _tail = event.connect(tagged(&out, "tail"));
    let armed_cb = Arc::clone(&armed);
    let _bomb = event.connect(move |_| {
        if armed_cb.swap(false, Ordering::Relaxed) {
            panic!("callback failure");
        }
    });

    let result = catch_unwind(AssertUnwindSafe(|| event.trigger(&())));
    assert!(result.is_err());
    assert!(take(&out).is_empty());

    let mut extra = event.connect(tagged(&out, "extra"));
    event.trigger(&());
    assert_eq!(take(&out), vec!["extra", "tail"]);

    extra.disconnect();
    assert_eq!(event.len(), 2);
}

#[test]
fn handle_dropped_inside_callback_keeps_subscription() {
    let event = Event::<()>::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let held: Arc<Mutex<Option<Handle>>> = Arc::new(Mutex::new(None));
    let held_cb = Arc::clone(&held);
    let hits_cb = Arc::clone(&hits);
    let handle = event.connect(move |_| {
        hits_cb.fetch_add(1, Ordering::Relaxed);
        drop(held_cb.lock().unwrap().take());
    });
    *held.lock().unwrap() = Some(handle);

    event.trigger(&());
    event.trigger(&());
    assert_eq!(hits.load(Ordering::Relaxed), 2);
    assert_eq!(event.len(), 1);
}
