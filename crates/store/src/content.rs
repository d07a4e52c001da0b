//! Content: the only handle through which a generic lookup is modified.

#![forbid(unsafe_code)]

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use lookups_core::{Executor, InstanceItem, Item, LookupConfig, LookupError, Result};
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use tracing::debug;

use crate::convert::{Convertor, ConvertingItem};
use crate::engine::GenericLookup;
use crate::storage::Pair;

impl Pair for InstanceItem {
    fn as_any(&self) -> &dyn Any { self }

    fn pair_eq(&self, other: &dyn Pair) -> bool {
        other.as_any().downcast_ref::<InstanceItem>().map_or(false, |other| self.same_instance(other))
    }

    fn pair_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        TypeId::of::<InstanceItem>().hash(&mut hasher);
        self.address().hash(&mut hasher);
        hasher.finish()
    }

    fn into_item(self: Arc<Self>) -> Arc<dyn Item> { self }
}

enum State {
    /// Pairs added before a lookup was attached.
    Detached(Vec<Arc<dyn Pair>>),
    Attached(GenericLookup),
}

struct ContentInner {
    executor: Option<Arc<dyn Executor>>,
    state: Mutex<State>,
}

/// Owner-side handle of a [`GenericLookup`].
///
/// Attaches to exactly one lookup. Cheap to clone; clones share the same
/// attachment.
#[derive(Clone)]
pub struct Content {
    inner: Arc<ContentInner>,
}

impl Default for Content {
    fn default() -> Self { Self::new() }
}

impl Content {
    /// Listeners are notified on the mutating thread.
    pub fn new() -> Self { Self::build(None) }

    /// Listeners are notified through `executor`, unless `LOOKUPS_NOTIFY_INLINE`
    /// is set.
    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        if LookupConfig::from_env().notify_inline {
            debug!("LOOKUPS_NOTIFY_INLINE set; executor ignored");
            return Self::build(None);
        }
        Self::build(Some(executor))
    }

    fn build(executor: Option<Arc<dyn Executor>>) -> Self {
        Self { inner: Arc::new(ContentInner { executor, state: Mutex::new(State::Detached(Vec::new())) }) }
    }

    pub fn has_executor(&self) -> bool { self.inner.executor.is_some() }

    /// The lookup this content is attached to, if any.
    pub fn lookup(&self) -> Option<GenericLookup> {
        match &*self.inner.state.lock() {
            State::Attached(lookup) => Some(lookup.clone()),
            State::Detached(_) => None,
        }
    }

    pub(crate) fn attach(&self, lookup: &GenericLookup) -> Result<()> {
        let early = {
            let mut state = self.inner.state.lock();
            let early = match &mut *state {
                State::Attached(existing) => {
                    return Err(LookupError::InvalidState(format!(
                        "trying to use content for {lookup:?} but it is already used for {existing:?}"
                    )));
                }
                State::Detached(early) => std::mem::take(early),
            };
            *state = State::Attached(lookup.clone());
            early
        };
        if !early.is_empty() {
            debug!(lookup = lookup.id(), pairs = early.len(), "installing early pairs");
            lookup.set_pairs(early, self.executor())?;
        }
        Ok(())
    }

    fn executor(&self) -> Option<&Arc<dyn Executor>> { self.inner.executor.as_ref() }

    /// Add a pair; returns true iff no equal pair was present.
    pub fn add_pair(&self, pair: Arc<dyn Pair>) -> Result<bool> {
        let lookup = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Attached(lookup) => lookup.clone(),
                State::Detached(early) => {
                    if let Some(slot) = early.iter_mut().find(|p| p.pair_eq(pair.as_ref())) {
                        *slot = pair;
                        return Ok(false);
                    }
                    early.push(pair);
                    return Ok(true);
                }
            }
        };
        lookup.add_pair(pair, self.executor())
    }

    pub fn remove_pair(&self, pair: Arc<dyn Pair>) -> Result<()> {
        let lookup = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Attached(lookup) => lookup.clone(),
                State::Detached(early) => {
                    early.retain(|p| !p.pair_eq(pair.as_ref()));
                    return Ok(());
                }
            }
        };
        lookup.remove_pair(pair, self.executor())
    }

    /// Replace everything with `pairs`. Equal pairs in `pairs` coalesce.
    pub fn set_pairs(&self, pairs: Vec<Arc<dyn Pair>>) -> Result<()> {
        let lookup = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Attached(lookup) => lookup.clone(),
                State::Detached(early) => {
                    early.clear();
                    for pair in pairs {
                        if !early.iter().any(|p| p.pair_eq(pair.as_ref())) {
                            early.push(pair);
                        }
                    }
                    return Ok(());
                }
            }
        };
        lookup.set_pairs(pairs, self.executor())
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner.state.lock() {
            State::Attached(lookup) => write!(f, "Content({lookup:?})"),
            State::Detached(early) => write!(f, "Content(detached, {} pairs)", early.len()),
        }
    }
}

/// Content storing plain instances and convertor-backed keys.
///
/// Dereferences to [`Content`], so it can be passed to
/// [`GenericLookup::new`] directly.
#[derive(Clone, Default)]
pub struct InstanceContent {
    content: Content,
}

impl InstanceContent {
    pub fn new() -> Self { Self::default() }

    pub fn with_executor(executor: Arc<dyn Executor>) -> Self { Self { content: Content::with_executor(executor) } }

    /// Add `instance`; returns true iff it was not present yet.
    pub fn add<T: Any + Send + Sync>(&self, instance: Arc<T>) -> Result<bool> {
        self.add_item(InstanceItem::new(instance))
    }

    /// Add `instance` under a persistent id.
    pub fn add_with_id<T: Any + Send + Sync>(&self, instance: Arc<T>, id: impl Into<String>) -> Result<bool> {
        self.add_item(InstanceItem::with_id(instance, Some(id.into())))
    }

    pub fn add_item(&self, item: InstanceItem) -> Result<bool> { self.content.add_pair(Arc::new(item)) }

    /// Lazily converted entry: `convertor` only runs when the instance is
    /// first requested.
    pub fn add_converted<K, V>(&self, key: K, convertor: &Arc<dyn Convertor<K, V>>) -> Result<bool>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Any + Send + Sync,
    {
        let item = ConvertingItem::new(key, Arc::clone(convertor))?;
        self.content.add_pair(Arc::new(item))
    }

    pub fn remove<T: Any + Send + Sync>(&self, instance: &Arc<T>) -> Result<()> {
        self.content.remove_pair(Arc::new(InstanceItem::new(Arc::clone(instance))))
    }

    pub fn remove_converted<K, V>(&self, key: K, convertor: &Arc<dyn Convertor<K, V>>) -> Result<()>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Any + Send + Sync,
    {
        let item = ConvertingItem::new(key, Arc::clone(convertor))?;
        self.content.remove_pair(Arc::new(item))
    }

    /// Replace the whole content with `items`, which may mix types.
    pub fn set(&self, items: impl IntoIterator<Item = InstanceItem>) -> Result<()> {
        let pairs = items.into_iter().map(|item| Arc::new(item) as Arc<dyn Pair>).collect();
        self.content.set_pairs(pairs)
    }

    /// Replace the whole content with instances of one type.
    pub fn set_instances<T: Any + Send + Sync>(&self, instances: impl IntoIterator<Item = Arc<T>>) -> Result<()> {
        self.set(instances.into_iter().map(InstanceItem::new))
    }

    pub fn set_converted<K, V>(&self, keys: impl IntoIterator<Item = K>, convertor: &Arc<dyn Convertor<K, V>>) -> Result<()>
    where
        K: Eq + Hash + Send + Sync + 'static,
        V: Any + Send + Sync,
    {
        let pairs = keys
            .into_iter()
            .map(|key| ConvertingItem::new(key, Arc::clone(convertor)).map(|item| Arc::new(item) as Arc<dyn Pair>))
            .collect::<Result<Vec<_>>>()?;
        self.content.set_pairs(pairs)
    }
}

impl Deref for InstanceContent {
    type Target = Content;
    fn deref(&self) -> &Content { &self.content }
}

impl fmt::Debug for InstanceContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Instance{:?}", self.content) }
}
