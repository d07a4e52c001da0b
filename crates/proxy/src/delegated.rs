//! Lookup forwarding to a swappable delegate.

use std::fmt;
use std::sync::{Arc, Weak};

use lookups_core::{
    same_lookup, same_result, Classes, Instance, Instances, Item, Items, Listener, ListenerList, Lookup,
    LookupProvider, LookupResult, TypeTag,
};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// Forwards every request to the lookup its provider currently supplies.
///
/// Call [`DelegatedLookup::lookup_updated`] whenever the provider may return a
/// different lookup; results handed out earlier stay valid and move over to
/// the new delegate, keeping their listeners.
pub struct DelegatedLookup {
    provider: Arc<dyn LookupProvider>,
    delegate: RwLock<Arc<dyn Lookup>>,
    results: Mutex<FxHashMap<TypeTag, Weak<DelegatedResult>>>,
}

impl DelegatedLookup {
    /// The provider is asked for its lookup immediately.
    pub fn new(provider: Arc<dyn LookupProvider>) -> Self {
        let delegate = provider.get_lookup();
        Self { provider, delegate: RwLock::new(delegate), results: Mutex::new(FxHashMap::default()) }
    }

    /// The lookup requests currently go to.
    pub fn delegate(&self) -> Arc<dyn Lookup> { Arc::clone(&self.delegate.read()) }

    /// Ask the provider again and, if it returned another lookup, switch every
    /// live result over to it.
    pub fn lookup_updated(&self) {
        let next = self.provider.get_lookup();
        let prev = std::mem::replace(&mut *self.delegate.write(), Arc::clone(&next));
        if same_lookup(&prev, &next) {
            return;
        }
        let live: Vec<Arc<DelegatedResult>> = {
            let mut results = self.results.lock();
            results.retain(|_, weak| weak.strong_count() > 0);
            results.values().filter_map(Weak::upgrade).collect()
        };
        debug!(results = live.len(), "delegate changed");
        for result in live {
            result.repoint(self.delegate().as_ref());
        }
    }
}

impl Lookup for DelegatedLookup {
    fn lookup_result(&self, tag: TypeTag) -> Arc<dyn LookupResult> {
        loop {
            if let Some(existing) = self.results.lock().get(&tag).and_then(Weak::upgrade) {
                return existing;
            }
            // resolved unlocked: the delegate's hooks may query this lookup
            let delegate = self.delegate();
            let upstream = delegate.lookup_result(tag);
            let mut results = self.results.lock();
            if let Some(existing) = results.get(&tag).and_then(Weak::upgrade) {
                return existing;
            }
            if !same_lookup(&delegate, &self.delegate()) {
                continue;
            }
            results.retain(|_, weak| weak.strong_count() > 0);
            let result = DelegatedResult::new(tag, upstream);
            results.insert(tag, Arc::downgrade(&result));
            return result;
        }
    }

    fn lookup_instance(&self, tag: TypeTag) -> Option<Instance> { self.delegate().lookup_instance(tag) }

    fn lookup_item(&self, tag: TypeTag) -> Option<Arc<dyn Item>> { self.delegate().lookup_item(tag) }

    fn lookup_instances(&self, tag: TypeTag) -> Instances { self.delegate().lookup_instances(tag) }
}

impl fmt::Debug for DelegatedLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedLookup").field("results", &self.results.lock().len()).finish()
    }
}

/// Result of a [`DelegatedLookup`]; wraps the current delegate's result.
pub struct DelegatedResult {
    tag: TypeTag,
    upstream: Mutex<Arc<dyn LookupResult>>,
    listeners: ListenerList,
    /// Subscribed to `upstream` while `listeners` is non-empty.
    proxy: Listener,
    me: Weak<DelegatedResult>,
}

impl DelegatedResult {
    fn new(tag: TypeTag, upstream: Arc<dyn LookupResult>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let weak = me.clone();
            let proxy = Listener::new(move |_| {
                if let Some(me) = weak.upgrade() {
                    me.fire();
                }
            });
            Self { tag, upstream: Mutex::new(upstream), listeners: ListenerList::new(), proxy, me: me.clone() }
        })
    }

    pub fn tag(&self) -> TypeTag { self.tag }

    fn current(&self) -> Arc<dyn LookupResult> { Arc::clone(&self.upstream.lock()) }

    fn fire(&self) {
        if let Some(me) = self.me.upgrade() {
            let source: Arc<dyn LookupResult> = me;
            self.listeners.fire(&source);
        }
    }

    fn repoint(&self, lookup: &dyn Lookup) {
        let next = lookup.lookup_result(self.tag);
        let (prev, listening) = {
            let mut upstream = self.upstream.lock();
            if same_result(&upstream, &next) {
                return;
            }
            let prev = std::mem::replace(&mut *upstream, Arc::clone(&next));
            let listening = self.listeners.has_listeners();
            if listening {
                prev.remove_listener(&self.proxy);
            }
            (prev, listening)
        };
        trace!(tag = %self.tag, listening, "result repointed");
        if !listening {
            return;
        }
        // classes, not instances: converted items stay unconverted
        if !prev.all_classes().is_empty() || !next.all_classes().is_empty() {
            self.fire();
        }
        let upstream = self.upstream.lock();
        if self.listeners.has_listeners() && same_result(&upstream, &next) {
            next.add_listener(&self.proxy);
        }
    }
}

impl LookupResult for DelegatedResult {
    fn add_listener(&self, listener: &Listener) {
        let upstream = self.upstream.lock();
        if self.listeners.add(listener) {
            upstream.add_listener(&self.proxy);
        }
    }

    fn remove_listener(&self, listener: &Listener) {
        let upstream = self.upstream.lock();
        if self.listeners.remove(listener) {
            upstream.remove_listener(&self.proxy);
        }
    }

    fn all_classes(&self) -> Classes { self.current().all_classes() }

    fn all_instances(&self) -> Instances { self.current().all_instances() }

    fn all_items(&self) -> Items { self.current().all_items() }
}

impl fmt::Debug for DelegatedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedResult").field("tag", &self.tag).field("listeners", &self.listeners).finish()
    }
}
