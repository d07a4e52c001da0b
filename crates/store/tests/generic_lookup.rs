#![forbid(unsafe_code)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{counting, register, serials, Child, ChildObject, OtherObject, Parent, ParentObject};
use lookups_core::{same_result, InstanceItem, Listener, Lookup, LookupError, LookupExt, TypeTag};
use lookups_store::{GenericLookup, InstanceContent, LookupHooks};
use parking_lot::Mutex;

fn setup(items: Vec<InstanceItem>) -> (InstanceContent, GenericLookup) {
    register();
    let content = InstanceContent::new();
    let lookup = GenericLookup::new(&content).expect("fresh content");
    content.set(items).expect("set");
    (content, lookup)
}

#[test]
fn content_attaches_once() {
    let (content, _lookup) = setup(Vec::new());
    let err = GenericLookup::new(&content).err();
    assert!(matches!(err, Some(LookupError::InvalidState(_))));
}

#[test]
fn early_pairs_become_initial_content() {
    register();
    let content = InstanceContent::new();
    let parent = Arc::new(ParentObject(1));
    assert!(content.add(Arc::clone(&parent)).expect("add"));
    assert!(content.add(Arc::new(ChildObject(2))).expect("add"));
    assert!(content.add(Arc::new(OtherObject(3))).expect("add"));
    assert!(!content.add(Arc::clone(&parent)).expect("add"), "same instance coalesces");

    let lookup = GenericLookup::new(&content).expect("attach");
    assert_eq!(lookup.len(), 3);
    assert_eq!(serials(&lookup.lookup_all::<dyn Parent>()), vec![1, 2]);
}

#[test]
fn removal_before_attach_leaves_nothing() {
    register();
    let content = InstanceContent::new();
    let (parent, other) = (Arc::new(ParentObject(1)), Arc::new(OtherObject(2)));
    content.set([InstanceItem::new(Arc::clone(&parent)), InstanceItem::new(Arc::clone(&other))]).expect("set");
    content.remove(&parent).expect("remove");
    content.remove(&other).expect("remove");
    let lookup = GenericLookup::new(&content).expect("attach");
    assert!(lookup.is_empty());
}

#[test]
fn queries_are_covariant() {
    let parent = Arc::new(ParentObject(1));
    let child = Arc::new(ChildObject(2));
    let other = Arc::new(OtherObject(3));
    let (_content, lookup) = setup(vec![
        InstanceItem::new(Arc::clone(&parent)),
        InstanceItem::new(Arc::clone(&child)),
        InstanceItem::new(Arc::clone(&other)),
    ]);

    assert_eq!(lookup.lookup::<dyn Parent>().map(|p| p.serial()), Some(1));
    assert_eq!(serials(&lookup.lookup_all::<dyn Parent>()), vec![1, 2]);
    assert_eq!(lookup.lookup::<dyn Child>().map(|c| c.serial()), Some(2));
    assert_eq!(lookup.lookup::<ParentObject>().map(|p| p.0), Some(1));
    assert_eq!(lookup.lookup::<OtherObject>().map(|o| o.0), Some(3));
    assert_eq!(lookup.lookup_instances(TypeTag::object()).len(), 3);

    let item = lookup.lookup_item_of::<dyn Child>().expect("child item");
    assert_eq!(item.type_tag(), TypeTag::of::<ChildObject>());
    assert!(!item.id().is_empty());
    assert!(item.display_name().contains("ChildObject"));
}

#[test]
fn absent_types_yield_nothing() {
    let (_content, lookup) = setup(vec![InstanceItem::new(Arc::new(ParentObject(1)))]);
    assert!(lookup.lookup::<dyn Child>().is_none());
    assert!(lookup.lookup_item_of::<OtherObject>().is_none());
    assert!(lookup.lookup_all::<ChildObject>().is_empty());
    let result = lookup.result::<OtherObject>();
    assert!(result.all_items().is_empty());
    assert!(result.all_classes().is_empty());
}

#[test]
fn equal_members_coalesce() {
    let other = Arc::new(OtherObject(1));
    let (_content, lookup) = setup(vec![
        InstanceItem::new(Arc::clone(&other)),
        InstanceItem::new(Arc::clone(&other)),
        InstanceItem::new(Arc::clone(&other)),
    ]);
    assert_eq!(lookup.lookup_instances(TypeTag::object()).len(), 1);
}

#[test]
fn results_are_shared_while_alive() {
    let (_content, lookup) = setup(Vec::new());
    let first = lookup.result::<dyn Parent>();
    let again = lookup.result::<dyn Parent>();
    assert!(same_result(&first, &again));
    assert_eq!(lookup.tracked_results(), 1);
    drop((first, again));
    assert_eq!(lookup.tracked_results(), 0);
}

#[test]
fn classes_are_distinct_concrete_types() {
    let (_content, lookup) = setup(vec![
        InstanceItem::new(Arc::new(ParentObject(1))),
        InstanceItem::new(Arc::new(ParentObject(2))),
        InstanceItem::new(Arc::new(ChildObject(3))),
        InstanceItem::new(Arc::new(OtherObject(4))),
    ]);
    let result = lookup.result::<dyn Parent>();
    let classes = result.all_classes();
    assert_eq!(classes.len(), 2);
    assert!(classes.contains(&TypeTag::of::<ParentObject>()));
    assert!(classes.contains(&TypeTag::of::<ChildObject>()));
    assert_eq!(result.all_items().len(), 3);
    assert_eq!(result.instances_of::<dyn Parent>().len(), 3);
}

#[test]
fn listeners_follow_relevant_changes() {
    let (content, lookup) = setup(Vec::new());
    let result = lookup.result::<dyn Parent>();
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = counting(&hits);
    result.add_listener(&listener);

    let parent = Arc::new(ParentObject(1));
    assert!(content.add(Arc::clone(&parent)).expect("add"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(result.all_instances().len(), 1);

    assert!(!content.add(Arc::clone(&parent)).expect("add"));
    assert_eq!(hits.load(Ordering::SeqCst), 1, "re-adding an equal member is silent");

    content.add(Arc::new(OtherObject(2))).expect("add");
    assert_eq!(hits.load(Ordering::SeqCst), 1, "unrelated type is silent");

    content.remove(&Arc::new(ParentObject(3))).expect("remove");
    assert_eq!(hits.load(Ordering::SeqCst), 1, "removing an absent member is silent");

    content.remove(&parent).expect("remove");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(result.all_instances().is_empty());

    result.remove_listener(&listener);
    content.add(Arc::new(ChildObject(4))).expect("add");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn listener_sees_updated_result() {
    let (content, lookup) = setup(Vec::new());
    let result = lookup.result::<dyn Child>();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let listener = {
        let seen = Arc::clone(&seen);
        Listener::new(move |source| seen.lock().push(source.all_instances().len()))
    };
    result.add_listener(&listener);
    content.add(Arc::new(ChildObject(1))).expect("add");
    content.add(Arc::new(ChildObject(2))).expect("add");
    assert_eq!(*seen.lock(), vec![1, 2]);
}

#[test]
fn every_listener_is_called_once() {
    let (content, lookup) = setup(Vec::new());
    let result = lookup.result::<dyn Parent>();
    let hits = Arc::new(AtomicUsize::new(0));
    let listeners: Vec<Listener> = (0..3).map(|_| counting(&hits)).collect();
    for l in &listeners {
        result.add_listener(l);
        result.add_listener(l);
    }
    content.add(Arc::new(ParentObject(1))).expect("add");
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn dropped_listener_is_forgotten() {
    let (content, lookup) = setup(Vec::new());
    let result = lookup.result::<dyn Parent>();
    let hits = Arc::new(AtomicUsize::new(0));
    result.add_listener(&counting(&hits));
    content.add(Arc::new(ParentObject(1))).expect("add");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn dropped_result_stops_notifying() {
    let (content, lookup) = setup(Vec::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = counting(&hits);
    lookup.result::<dyn Parent>().add_listener(&listener);
    content.add(Arc::new(ParentObject(1))).expect("add");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(lookup.tracked_results(), 0);
}

#[test]
fn modifying_from_listener_is_rejected() {
    let (content, lookup) = setup(Vec::new());
    let result = lookup.result::<dyn Parent>();
    let outcome = Arc::new(Mutex::new(None));
    let listener = {
        let (content, outcome) = (content.clone(), Arc::clone(&outcome));
        Listener::new(move |_| {
            *outcome.lock() = Some(content.add(Arc::new(OtherObject(9))));
        })
    };
    result.add_listener(&listener);

    content.add(Arc::new(ParentObject(1))).expect("outer add succeeds");
    let nested = outcome.lock().take().expect("listener ran");
    assert!(matches!(nested, Err(LookupError::InvalidState(_))));
    assert!(lookup.lookup::<OtherObject>().is_none());

    // the guard is released afterwards
    assert!(content.add(Arc::new(OtherObject(2))).expect("add"));
}

#[test]
fn listener_may_modify_another_lookup() {
    let (content, lookup) = setup(Vec::new());
    let (mirror_content, mirror) = setup(Vec::new());
    let result = lookup.result::<dyn Parent>();
    let listener = {
        let mirror_content = mirror_content.clone();
        Listener::new(move |source| {
            let all: Vec<Arc<dyn Parent>> = source.instances_of::<dyn Parent>();
            mirror_content.set_instances(all.iter().map(|p| Arc::new(ParentObject(p.serial())))).expect("mirror");
        })
    };
    result.add_listener(&listener);
    content.add(Arc::new(ParentObject(7))).expect("add");
    assert_eq!(mirror.lookup::<ParentObject>().map(|p| p.0), Some(7));
}

#[derive(Default)]
struct Seeding {
    queries: AtomicUsize,
    seed: Mutex<Option<InstanceContent>>,
}

impl LookupHooks for Seeding {
    fn initialise(&self, _lookup: &GenericLookup) {
        if let Some(content) = self.seed.lock().take() {
            content.add(Arc::new(ParentObject(42))).expect("seed");
        }
    }

    fn before_lookup(&self, _lookup: &GenericLookup, _tag: TypeTag) { self.queries.fetch_add(1, Ordering::SeqCst); }
}

#[test]
fn hooks_initialise_once_and_observe_queries() {
    register();
    let content = InstanceContent::new();
    let hooks = Arc::new(Seeding::default());
    *hooks.seed.lock() = Some(content.clone());
    let lookup = GenericLookup::with_hooks(&content, hooks.clone()).expect("attach");

    assert_eq!(lookup.lookup::<dyn Parent>().map(|p| p.serial()), Some(42));
    assert_eq!(lookup.len(), 1);
    let result = lookup.result::<dyn Parent>();
    result.all_items();
    result.all_classes();
    assert!(hooks.queries.load(Ordering::SeqCst) >= 4);
}

#[test]
fn concurrent_writers_lose_nothing() {
    let (content, lookup) = setup(Vec::new());
    let result = lookup.result::<ParentObject>();
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = counting(&hits);
    result.add_listener(&listener);

    std::thread::scope(|s| {
        for t in 0..4u32 {
            let content = content.clone();
            s.spawn(move || {
                for n in 0..50u32 {
                    content.add(Arc::new(ParentObject(t * 100 + n))).expect("add");
                }
            });
        }
    });

    assert_eq!(lookup.len(), 200);
    assert_eq!(result.all_instances().len(), 200);
    assert_eq!(hits.load(Ordering::SeqCst), 200);
}
