//! Generic lookup: a [`Lookup`] over a [`SetStorage`], mutated only through
//! its [`Content`](crate::Content).
//!
//! Writers are serialized by one mutex and each mutation is one transaction.
//! Readers never take it: they query immutable storage snapshots. Listeners of
//! affected results run after the writer lock is released, either inline or on
//! the content's executor. A thread that is inside a mutation or an inline
//! notification of a lookup cannot mutate that same lookup again.

#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use lookups_core::{
    Classes, Executor, Instances, Item, Items, Listener, ListenerList, Lookup, LookupError, LookupResult, Result,
    TypeTag,
};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, ReentrantMutex};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::storage::{Pair, SetStorage, TrackedResult, Transaction, ENSURE_ADD_ONE, ENSURE_REMOVE_ONE};
use crate::Content;

static NEXT_LOOKUP_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Ids of the lookups this thread is currently mutating or notifying for.
    static ACTIVE_WRITES: RefCell<SmallVec<[u64; 4]>> = RefCell::new(SmallVec::new());
}

/// Marks `id` as being written by the current thread until dropped.
struct WriteScope {
    id: u64,
}

impl WriteScope {
    fn enter(id: u64) -> Result<Self> {
        ACTIVE_WRITES.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&id) {
                return Err(LookupError::InvalidState(
                    "you are trying to modify a lookup from a lookup query/transaction".to_string(),
                ));
            }
            active.push(id);
            Ok(Self { id })
        })
    }
}

impl Drop for WriteScope {
    fn drop(&mut self) {
        ACTIVE_WRITES.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|id| *id == self.id) {
                active.remove(pos);
            }
        });
    }
}

/// Extension points of a generic lookup.
pub trait LookupHooks: Send + Sync {
    /// Runs once, before the first query or mutation touches the storage.
    /// May populate the lookup through its content.
    fn initialise(&self, lookup: &GenericLookup) { let _ = lookup; }

    /// Runs before every query for `tag`, including result accessors.
    fn before_lookup(&self, lookup: &GenericLookup, tag: TypeTag) { let _ = (lookup, tag); }
}

struct NoHooks;

impl LookupHooks for NoHooks {}

struct Inner {
    id: u64,
    hooks: Arc<dyn LookupHooks>,
    storage: OnceCell<SetStorage<GlResult>>,
    /// Holds whether `initialise` has started; re-entrant so the hook can
    /// populate the lookup on the same thread.
    init: ReentrantMutex<Cell<bool>>,
    initialised: AtomicBool,
    writer: Mutex<()>,
}

/// Lookup backed by transactional set storage.
///
/// Cheap to clone; clones share content, results and listeners.
#[derive(Clone)]
pub struct GenericLookup {
    inner: Arc<Inner>,
}

impl GenericLookup {
    /// Create a lookup and attach it to `content`. Pairs added to the content
    /// before this call become the initial content.
    pub fn new(content: &Content) -> Result<Self> { Self::with_hooks(content, Arc::new(NoHooks)) }

    pub fn with_hooks(content: &Content, hooks: Arc<dyn LookupHooks>) -> Result<Self> {
        let lookup = Self {
            inner: Arc::new(Inner {
                id: NEXT_LOOKUP_ID.fetch_add(1, Ordering::Relaxed),
                hooks,
                storage: OnceCell::new(),
                init: ReentrantMutex::new(Cell::new(false)),
                initialised: AtomicBool::new(false),
                writer: Mutex::new(()),
            }),
        };
        content.attach(&lookup)?;
        debug!(lookup = lookup.inner.id, "generic lookup created");
        Ok(lookup)
    }

    pub fn id(&self) -> u64 { self.inner.id }

    /// Number of pairs currently stored.
    pub fn len(&self) -> usize { self.storage().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Number of live results the storage tracks.
    pub fn tracked_results(&self) -> usize { self.storage().tracked_results() }

    pub fn same(&self, other: &GenericLookup) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }

    fn storage(&self) -> &SetStorage<GlResult> {
        let storage = self.inner.storage.get_or_init(SetStorage::new);
        if !self.inner.initialised.load(Ordering::Acquire) {
            let started = self.inner.init.lock();
            if !started.replace(true) {
                debug!(lookup = self.inner.id, "initialising storage");
                self.inner.hooks.initialise(self);
                self.inner.initialised.store(true, Ordering::Release);
            }
        }
        storage
    }

    fn before_lookup(&self, tag: TypeTag) { self.inner.hooks.before_lookup(self, tag) }

    pub(crate) fn add_pair(&self, pair: Arc<dyn Pair>, executor: Option<&Arc<dyn Executor>>) -> Result<bool> {
        self.modify(ENSURE_ADD_ONE, executor, |tx| tx.add(pair))
    }

    pub(crate) fn remove_pair(&self, pair: Arc<dyn Pair>, executor: Option<&Arc<dyn Executor>>) -> Result<()> {
        self.modify(ENSURE_REMOVE_ONE, executor, |tx| {
            tx.remove(pair);
        })
    }

    pub(crate) fn set_pairs(&self, pairs: Vec<Arc<dyn Pair>>, executor: Option<&Arc<dyn Executor>>) -> Result<()> {
        let ensure = pairs.len() as isize;
        self.modify(ensure, executor, |tx| tx.set_all(pairs))
    }

    fn modify<R>(
        &self,
        ensure: isize,
        executor: Option<&Arc<dyn Executor>>,
        f: impl FnOnce(&mut Transaction) -> R,
    ) -> Result<R> {
        let storage = self.storage();
        let scope = match WriteScope::enter(self.inner.id) {
            Ok(scope) => scope,
            Err(err) => {
                metrics::counter!("lookup_reentrant_rejections_total", 1u64);
                warn!(lookup = self.inner.id, "re-entrant modification rejected");
                return Err(err);
            }
        };
        let (out, affected) = {
            let _writer = self.inner.writer.lock();
            let mut tx = storage.begin_transaction(ensure);
            let out = f(&mut tx);
            (out, storage.end_transaction(tx))
        };
        metrics::counter!("lookup_transactions_total", 1u64);
        self.notify(executor, affected);
        drop(scope);
        Ok(out)
    }

    fn notify(&self, executor: Option<&Arc<dyn Executor>>, affected: Vec<Arc<GlResult>>) {
        if affected.is_empty() {
            return;
        }
        metrics::counter!("lookup_notifications_total", affected.len() as u64);
        match executor {
            None => {
                trace!(lookup = self.inner.id, results = affected.len(), "notifying inline");
                for result in affected {
                    result.fire();
                }
            }
            Some(executor) => {
                trace!(lookup = self.inner.id, results = affected.len(), "submitting notifications");
                for result in affected {
                    executor.execute(Box::new(move || {
                        result.fire();
                    }));
                }
            }
        }
    }
}

impl Lookup for GenericLookup {
    fn lookup_result(&self, tag: TypeTag) -> Arc<dyn LookupResult> {
        self.before_lookup(tag);
        self.storage().find_or_register(tag, || GlResult::new(self.clone(), tag))
    }

    fn lookup_item(&self, tag: TypeTag) -> Option<Arc<dyn Item>> {
        self.before_lookup(tag);
        self.storage().lookup(tag).next().map(|pair| pair.into_item())
    }
}

impl fmt::Debug for GenericLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "GenericLookup#{}", self.inner.id) }
}

#[derive(Default)]
struct ResultCache {
    generation: u64,
    classes: Option<Classes>,
    items: Option<Items>,
    instances: Option<Instances>,
}

/// Live result of a [`GenericLookup`] query.
///
/// Caches what it computed until a transaction touching its type clears it.
pub struct GlResult {
    lookup: GenericLookup,
    tag: TypeTag,
    listeners: ListenerList,
    cache: Mutex<ResultCache>,
    me: Weak<GlResult>,
}

impl GlResult {
    fn new(lookup: GenericLookup, tag: TypeTag) -> Arc<Self> {
        trace!(lookup = lookup.inner.id, tag = %tag, "result created");
        Arc::new_cyclic(|me| Self {
            lookup,
            tag,
            listeners: ListenerList::new(),
            cache: Mutex::new(ResultCache::default()),
            me: me.clone(),
        })
    }

    pub fn tag(&self) -> TypeTag { self.tag }

    pub fn has_listeners(&self) -> bool { self.listeners.has_listeners() }

    fn fire(&self) {
        if let Some(me) = self.me.upgrade() {
            let source: Arc<dyn LookupResult> = me;
            self.listeners.fire(&source);
        }
    }

    fn generation(&self) -> u64 { self.cache.lock().generation }

    fn compute_items(&self) -> Items {
        if let Some(items) = &self.cache.lock().items {
            return Arc::clone(items);
        }
        let generation = self.generation();
        let items: Items = self.lookup.storage().lookup(self.tag).map(|pair| pair.into_item()).collect::<Vec<_>>().into();
        let mut cache = self.cache.lock();
        if cache.generation == generation {
            cache.items = Some(Arc::clone(&items));
        }
        items
    }
}

impl TrackedResult for GlResult {
    fn tag(&self) -> TypeTag { self.tag }

    fn clear_cache(&self) {
        let mut cache = self.cache.lock();
        cache.generation = cache.generation.wrapping_add(1);
        cache.classes = None;
        cache.items = None;
        cache.instances = None;
    }
}

impl LookupResult for GlResult {
    fn add_listener(&self, listener: &Listener) { self.listeners.add(listener); }

    fn remove_listener(&self, listener: &Listener) { self.listeners.remove(listener); }

    fn all_classes(&self) -> Classes {
        self.lookup.before_lookup(self.tag);
        if let Some(classes) = &self.cache.lock().classes {
            return Arc::clone(classes);
        }
        let generation = self.generation();
        let classes: Classes = Arc::new(self.compute_items().iter().map(|item| item.type_tag()).collect::<FxHashSet<_>>());
        let mut cache = self.cache.lock();
        if cache.generation == generation {
            cache.classes = Some(Arc::clone(&classes));
        }
        classes
    }

    fn all_instances(&self) -> Instances {
        self.lookup.before_lookup(self.tag);
        if let Some(instances) = &self.cache.lock().instances {
            return Arc::clone(instances);
        }
        let generation = self.generation();
        let tag = self.tag;
        let instances: Instances = self
            .compute_items()
            .iter()
            .filter(|item| item.type_tag().is_assignable_to(tag))
            .filter_map(|item| item.instance())
            .collect::<Vec<_>>()
            .into();
        let mut cache = self.cache.lock();
        if cache.generation == generation {
            cache.instances = Some(Arc::clone(&instances));
        }
        instances
    }

    fn all_items(&self) -> Items {
        self.lookup.before_lookup(self.tag);
        self.compute_items()
    }
}

impl fmt::Debug for GlResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlResult").field("lookup", &self.lookup).field("tag", &self.tag).finish()
    }
}
