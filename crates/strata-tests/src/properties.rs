//! Property stores, events and serialization across services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use strata_core::{Context, Properties, Value, PROPERTY_CHANGED};
use strata_effects::ColourProducer;

// ── Helpers ────────────────────────────────────────────────────

struct Tracked(Arc<AtomicUsize>);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Reference counting ─────────────────────────────────────────

#[test]
fn store_shared_by_threads_is_destroyed_once() {
    let drops = Arc::new(AtomicUsize::new(0));
    let props = Properties::new();
    props.set_data("payload", Tracked(drops.clone()), 0).unwrap();
    props.set_data("other", Tracked(drops.clone()), 0).unwrap();

    let first = props.clone();
    let second = props.clone();
    assert_eq!(props.ref_count(), 3);

    let workers: Vec<_> = [first, second]
        .into_iter()
        .map(|handle| thread::spawn(move || handle.get_data::<Tracked>("payload").is_some()))
        .collect();
    for worker in workers {
        assert!(worker.join().unwrap());
    }
    assert_eq!(props.ref_count(), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(props);
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn rebinding_drops_previous_value_before_new_binding() {
    struct Observer {
        store: Properties,
        seen: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl Drop for Observer {
        fn drop(&mut self) {
            self.seen.lock().push(self.store.get("payload"));
        }
    }

    let props = Properties::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    props
        .set_data(
            "payload",
            Observer {
                store: props.clone(),
                seen: seen.clone(),
            },
            0,
        )
        .unwrap();
    props.set("payload", "text").unwrap();

    assert_eq!(*seen.lock(), vec![None]);
    assert_eq!(props.get("payload").as_deref(), Some("text"));
    assert_eq!(props.ref_count(), 1);
}

// ── Coercion ───────────────────────────────────────────────────

#[test]
fn numeric_reads_parse_text_every_time() {
    let props = Properties::new();
    props.set("level", "0.75").unwrap();
    assert_eq!(props.get_double("level"), 0.75);
    props.set("level", "2").unwrap();
    assert_eq!(props.get_int("level"), 2);
    assert_eq!(props.get_double("level"), 2.0);
    assert_eq!(props.get_int("missing"), 0);
    assert!(props.get("missing").is_none());
    assert!(props.set("", "x").is_err());
}

#[test]
fn services_inherit_configuration() {
    let ctx = Context::default();
    let settings = Properties::from_text("colour=white\nlength=40\n").unwrap();
    let producer = ColourProducer::create(&ctx, None).unwrap();
    producer.inherit(&settings).unwrap();
    assert_eq!(producer.get("colour").as_deref(), Some("white"));
    assert_eq!(producer.length(), 40);
}

// ── Events ─────────────────────────────────────────────────────

#[test]
fn listener_sees_single_argument_until_disconnected() {
    let props = Properties::new();
    props.register_event("changed").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let handle = props
        .listen("changed", move |_, args| s.lock().push(args[0].as_int()))
        .unwrap();

    assert_eq!(props.fire("changed", &[Value::Int(42)]), 1);
    assert_eq!(*seen.lock(), vec![42]);

    assert!(props.disconnect(&handle));
    assert_eq!(props.fire("changed", &[Value::Int(42)]), 0);
    assert_eq!(*seen.lock(), vec![42]);
}

#[test]
fn property_changes_reach_service_listeners() {
    let ctx = Context::default();
    let producer = ColourProducer::create(&ctx, None).unwrap();
    producer.init_events();
    let names = Arc::new(Mutex::new(Vec::new()));
    let n = names.clone();
    producer
        .listen(PROPERTY_CHANGED, move |_, args| {
            if let Some(name) = args.first().and_then(Value::as_string) {
                n.lock().push(name);
            }
        })
        .unwrap();
    producer.set("colour", "red").unwrap();
    assert!(names.lock().iter().any(|name| name == "colour"));
}

// ── Serialization ──────────────────────────────────────────────

#[test]
fn yaml_round_trip_keeps_order_and_nesting() {
    let props = Properties::new();
    props.set("title", "Evening news").unwrap();
    props.set_int("tracks", 2).unwrap();
    let clips = Properties::new();
    for (i, name) in ["intro", "story"].iter().enumerate() {
        let clip = Properties::new();
        clip.set("resource", name).unwrap();
        clip.set_int("length", 25 * (i as i32 + 1)).unwrap();
        clips.set_properties(&i.to_string(), &clip).unwrap();
    }
    props.set_properties("clips", &clips).unwrap();
    props.set_data("cache", vec![0u8; 16], 16).unwrap();

    let yaml = props.to_yaml();
    assert!(!yaml.contains("cache"));
    let back = Properties::from_yaml(&yaml).unwrap();
    assert_eq!(back.names(), ["title", "tracks", "clips"]);
    assert_eq!(back.get("title").as_deref(), Some("Evening news"));
    assert_eq!(back.get_int("tracks"), 2);
    let story = back
        .get_properties("clips")
        .and_then(|c| c.get_properties("1"))
        .unwrap();
    assert_eq!(story.get("resource").as_deref(), Some("story"));
    assert_eq!(story.get_int("length"), 50);
    assert_eq!(back.to_yaml(), props.to_yaml());
}
