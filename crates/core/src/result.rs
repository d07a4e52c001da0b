//! Live query results and their (weakly held) listeners.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::item::Item;
use crate::types::{self, Instance, TypeTag};

/// Concrete classes present in a result, duplicates omitted.
pub type Classes = Arc<FxHashSet<TypeTag>>;
/// Instances of a result, in result order.
pub type Instances = Arc<[Instance]>;
/// Items of a result, in result order.
pub type Items = Arc<[Arc<dyn Item>]>;

/// Result of a lookup request: every match for one queried type.
///
/// A result is live: it reflects the lookup's current content and notifies its
/// listeners when that content may have changed. It can contain duplicates.
/// Keep a strong reference to the result for as long as you want notifications.
pub trait LookupResult: Send + Sync {
    /// Register a listener invoked on every possible change of this result.
    /// The result only keeps a weak reference to it.
    fn add_listener(&self, listener: &Listener);

    fn remove_listener(&self, listener: &Listener);

    fn all_classes(&self) -> Classes;

    fn all_instances(&self) -> Instances;

    fn all_items(&self) -> Items;
}

impl dyn LookupResult {
    /// Typed view of [`LookupResult::all_instances`].
    pub fn instances_of<Q: ?Sized + 'static>(&self) -> Vec<Arc<Q>> {
        self.all_instances().iter().filter_map(types::cast::<Q>).collect()
    }
}

/// Whether two result handles are the same result object.
pub fn same_result(a: &Arc<dyn LookupResult>, b: &Arc<dyn LookupResult>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

type ListenerFn = dyn Fn(&Arc<dyn LookupResult>) + Send + Sync;

/// Callback handle for result changes.
///
/// Results hold listeners weakly: once every clone of a `Listener` is dropped
/// it stops being called, no explicit removal needed.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Arc<dyn LookupResult>) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, source: &Arc<dyn LookupResult>) { (self.0)(source) }

    pub fn ptr_eq(&self, other: &Listener) -> bool { self.addr() == other.addr() }

    fn addr(&self) -> *const () { Arc::as_ptr(&self.0) as *const () }

    fn downgrade(&self) -> WeakListener { WeakListener(Arc::downgrade(&self.0)) }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Listener({:p})", self.addr()) }
}

struct WeakListener(Weak<ListenerFn>);

impl WeakListener {
    fn is(&self, listener: &Listener) -> bool { self.0.as_ptr() as *const () == listener.addr() }
    fn is_alive(&self) -> bool { self.0.strong_count() > 0 }
    fn upgrade(&self) -> Option<Listener> { self.0.upgrade().map(Listener) }
}

/// Registration-ordered list of weak listeners.
///
/// `add` and `remove` report the 0→1 and 1→0 transitions so composite results
/// can (un)subscribe their single upstream proxy listener exactly then.
#[derive(Default)]
pub struct ListenerList {
    entries: Mutex<SmallVec<[WeakListener; 2]>>,
}

impl ListenerList {
    pub fn new() -> Self { Self::default() }

    /// Returns true when `listener` is the first live listener.
    /// Adding an already registered listener does nothing.
    pub fn add(&self, listener: &Listener) -> bool {
        let mut entries = self.entries.lock();
        entries.retain(|w| w.is_alive());
        if entries.iter().any(|w| w.is(listener)) {
            return false;
        }
        let first = entries.is_empty();
        entries.push(listener.downgrade());
        first
    }

    /// Returns true when removing `listener` left the list empty.
    pub fn remove(&self, listener: &Listener) -> bool {
        let mut entries = self.entries.lock();
        let mut removed = false;
        entries.retain(|w| {
            if w.is(listener) {
                removed = true;
                false
            } else {
                w.is_alive()
            }
        });
        removed && entries.is_empty()
    }

    pub fn has_listeners(&self) -> bool {
        let mut entries = self.entries.lock();
        entries.retain(|w| w.is_alive());
        !entries.is_empty()
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.retain(|w| w.is_alive());
        entries.len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Call every live listener in registration order with `source`.
    /// A listener removed while this runs is skipped from that point on.
    /// Returns how many listeners were called.
    pub fn fire(&self, source: &Arc<dyn LookupResult>) -> usize {
        let live: SmallVec<[Listener; 2]> = {
            let mut entries = self.entries.lock();
            entries.retain(|w| w.is_alive());
            entries.iter().filter_map(WeakListener::upgrade).collect()
        };
        let mut fired = 0;
        for listener in live {
            if self.contains(&listener) {
                listener.call(source);
                fired += 1;
            }
        }
        fired
    }

    fn contains(&self, listener: &Listener) -> bool {
        self.entries.lock().iter().any(|w| w.is(listener))
    }
}

impl fmt::Debug for ListenerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList").field("len", &self.entries.lock().len()).finish()
    }
}
