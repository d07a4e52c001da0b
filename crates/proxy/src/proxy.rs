//! Union of an ordered list of lookups.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use lookups_core::{
    same_lookup, same_result, Classes, Instance, Instances, Item, Items, Listener, ListenerList, Lookup,
    LookupResult, TypeTag,
};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::debug;

/// Lookup merging the content of several lookups.
///
/// Single-answer queries return the first match in list order; results
/// concatenate the backing results in list order. Backing lookups can be added
/// and removed at any time and live results follow.
///
/// No lock is held while backing lookups are queried, so their hooks may query
/// this lookup again.
pub struct ProxyLookup {
    lookups: RwLock<Vec<Arc<dyn Lookup>>>,
    /// Bumped under `results` on every change of `lookups`.
    version: AtomicU64,
    results: Mutex<FxHashMap<TypeTag, Weak<ProxyResult>>>,
    /// Serializes `add_lookup`/`remove_lookup` so live results see sources in
    /// list order. Re-entrant: listeners they fire may change sources too.
    changes: ReentrantMutex<()>,
}

impl Default for ProxyLookup {
    fn default() -> Self { Self::new(Vec::new()) }
}

impl ProxyLookup {
    pub fn new(lookups: Vec<Arc<dyn Lookup>>) -> Self {
        Self {
            lookups: RwLock::new(lookups),
            version: AtomicU64::new(0),
            results: Mutex::new(FxHashMap::default()),
            changes: ReentrantMutex::new(()),
        }
    }

    pub fn lookups(&self) -> Vec<Arc<dyn Lookup>> { self.lookups.read().clone() }

    /// Append `lookup` to the sources; live results pick it up.
    pub fn add_lookup(&self, lookup: Arc<dyn Lookup>) {
        let _changes = self.changes.lock();
        let live = {
            let mut results = self.results.lock();
            self.lookups.write().push(Arc::clone(&lookup));
            self.version.fetch_add(1, Ordering::AcqRel);
            live_results(&mut results)
        };
        debug!(sources = self.lookups.read().len(), results = live.len(), "lookup added");
        for result in live {
            result.lookup_added(&lookup);
        }
    }

    /// Remove the first source that is `lookup`. Unknown lookups are ignored.
    pub fn remove_lookup(&self, lookup: &Arc<dyn Lookup>) {
        let _changes = self.changes.lock();
        let live = {
            let mut results = self.results.lock();
            let mut lookups = self.lookups.write();
            let Some(pos) = lookups.iter().position(|l| same_lookup(l, lookup)) else {
                return;
            };
            lookups.remove(pos);
            self.version.fetch_add(1, Ordering::AcqRel);
            live_results(&mut results)
        };
        debug!(sources = self.lookups.read().len(), results = live.len(), "lookup removed");
        for result in live {
            result.lookup_removed(lookup);
        }
    }
}

fn live_results(results: &mut FxHashMap<TypeTag, Weak<ProxyResult>>) -> Vec<Arc<ProxyResult>> {
    results.retain(|_, weak| weak.strong_count() > 0);
    results.values().filter_map(Weak::upgrade).collect()
}

impl Lookup for ProxyLookup {
    fn lookup_result(&self, tag: TypeTag) -> Arc<dyn LookupResult> {
        loop {
            let (version, lookups) = {
                let results = self.results.lock();
                if let Some(existing) = results.get(&tag).and_then(Weak::upgrade) {
                    return existing;
                }
                (self.version.load(Ordering::Acquire), self.lookups())
            };
            let sources: SmallVec<[Source; 4]> = lookups
                .into_iter()
                .map(|lookup| {
                    let result = lookup.lookup_result(tag);
                    Source { lookup, result }
                })
                .collect();
            let mut results = self.results.lock();
            if let Some(existing) = results.get(&tag).and_then(Weak::upgrade) {
                return existing;
            }
            if self.version.load(Ordering::Acquire) != version {
                // sources changed while resolving
                continue;
            }
            results.retain(|_, weak| weak.strong_count() > 0);
            let result = ProxyResult::new(tag, sources);
            results.insert(tag, Arc::downgrade(&result));
            return result;
        }
    }

    fn lookup_instance(&self, tag: TypeTag) -> Option<Instance> {
        self.lookups().iter().find_map(|lookup| lookup.lookup_instance(tag))
    }

    fn lookup_item(&self, tag: TypeTag) -> Option<Arc<dyn Item>> {
        self.lookups().iter().find_map(|lookup| lookup.lookup_item(tag))
    }
}

impl fmt::Debug for ProxyLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyLookup").field("sources", &self.lookups.read().len()).finish()
    }
}

struct Source {
    lookup: Arc<dyn Lookup>,
    result: Arc<dyn LookupResult>,
}

/// Result of a [`ProxyLookup`]: the union of one result per source.
pub struct ProxyResult {
    tag: TypeTag,
    sources: Mutex<SmallVec<[Source; 4]>>,
    listeners: ListenerList,
    /// Subscribed to every source result while `listeners` is non-empty.
    proxy: Listener,
    me: Weak<ProxyResult>,
}

impl ProxyResult {
    fn new(tag: TypeTag, sources: SmallVec<[Source; 4]>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let weak = me.clone();
            let proxy = Listener::new(move |_| {
                if let Some(me) = weak.upgrade() {
                    me.fire();
                }
            });
            Self { tag, sources: Mutex::new(sources), listeners: ListenerList::new(), proxy, me: me.clone() }
        })
    }

    pub fn tag(&self) -> TypeTag { self.tag }

    fn fire(&self) {
        if let Some(me) = self.me.upgrade() {
            let source: Arc<dyn LookupResult> = me;
            self.listeners.fire(&source);
        }
    }

    fn upstream(&self) -> SmallVec<[Arc<dyn LookupResult>; 4]> {
        self.sources.lock().iter().map(|s| Arc::clone(&s.result)).collect()
    }

    fn lookup_added(&self, lookup: &Arc<dyn Lookup>) {
        let added = lookup.lookup_result(self.tag);
        let listening = {
            let mut sources = self.sources.lock();
            sources.push(Source { lookup: Arc::clone(lookup), result: Arc::clone(&added) });
            self.listeners.has_listeners()
        };
        if listening {
            // classes, not instances: converted items stay unconverted
            if !added.all_classes().is_empty() {
                self.fire();
            }
            added.add_listener(&self.proxy);
        }
    }

    fn lookup_removed(&self, lookup: &Arc<dyn Lookup>) {
        let (removed, shared, listening) = {
            let mut sources = self.sources.lock();
            let Some(pos) = sources.iter().position(|s| same_lookup(&s.lookup, lookup)) else {
                return;
            };
            let removed = sources.remove(pos).result;
            let shared = sources.iter().any(|s| same_result(&s.result, &removed));
            (removed, shared, self.listeners.has_listeners())
        };
        if listening {
            if !shared {
                removed.remove_listener(&self.proxy);
            }
            if !removed.all_classes().is_empty() {
                self.fire();
            }
        }
    }
}

impl LookupResult for ProxyResult {
    fn add_listener(&self, listener: &Listener) {
        let sources = self.sources.lock();
        if self.listeners.add(listener) {
            for source in sources.iter() {
                source.result.add_listener(&self.proxy);
            }
        }
    }

    fn remove_listener(&self, listener: &Listener) {
        let sources = self.sources.lock();
        if self.listeners.remove(listener) {
            for source in sources.iter() {
                source.result.remove_listener(&self.proxy);
            }
        }
    }

    fn all_classes(&self) -> Classes {
        let mut classes = FxHashSet::default();
        for result in self.upstream() {
            classes.extend(result.all_classes().iter().copied());
        }
        Arc::new(classes)
    }

    fn all_instances(&self) -> Instances {
        let mut instances = Vec::new();
        for result in self.upstream() {
            instances.extend(result.all_instances().iter().cloned());
        }
        instances.into()
    }

    fn all_items(&self) -> Items {
        let mut items = Vec::new();
        for result in self.upstream() {
            items.extend(result.all_items().iter().cloned());
        }
        items.into()
    }
}

impl fmt::Debug for ProxyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyResult")
            .field("tag", &self.tag)
            .field("sources", &self.sources.lock().len())
            .field("listeners", &self.listeners)
            .finish()
    }
}
