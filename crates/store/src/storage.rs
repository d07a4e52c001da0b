//! Set storage: the authoritative pair set of one generic lookup, plus the weak
//! registry of live results that transactions must invalidate.

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use lookups_core::{Item, TypeTag};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// An item as stored by the generic lookup; adds set semantics to [`Item`].
pub trait Pair: Item {
    fn as_any(&self) -> &dyn Any;

    /// Equal pairs coalesce inside a storage.
    fn pair_eq(&self, other: &dyn Pair) -> bool;

    /// Must agree with [`Pair::pair_eq`].
    fn pair_hash(&self) -> u64;

    fn into_item(self: Arc<Self>) -> Arc<dyn Item>;
}

/// A result the storage tracks weakly and invalidates on overlapping changes.
pub trait TrackedResult: Send + Sync {
    fn tag(&self) -> TypeTag;
    fn clear_cache(&self);
}

#[derive(Clone)]
pub(crate) struct PairRef(pub(crate) Arc<dyn Pair>);

impl PartialEq for PairRef {
    fn eq(&self, other: &Self) -> bool { self.0.pair_eq(other.0.as_ref()) }
}

impl Eq for PairRef {}

impl Hash for PairRef {
    fn hash<H: Hasher>(&self, state: &mut H) { state.write_u64(self.0.pair_hash()) }
}

/// Ensure hint: one pair is about to be added.
pub const ENSURE_ADD_ONE: isize = -2;
/// Ensure hint: one pair is about to be removed.
pub const ENSURE_REMOVE_ONE: isize = -1;

/// Working copy of the content plus the pairs changed so far.
///
/// Only lives for one mutation call; [`SetStorage::end_transaction`] installs it.
pub struct Transaction {
    pairs: Vec<PairRef>,
    index: FxHashSet<PairRef>,
    changed: Vec<PairRef>,
    changed_index: FxHashSet<PairRef>,
}

impl Transaction {
    fn new(ensure: isize, current: &[PairRef]) -> Self {
        let cap = match ensure {
            ENSURE_ADD_ONE => current.len() + 1,
            n if n >= 0 => current.len().max(n as usize),
            _ => current.len(),
        };
        let mut pairs = Vec::with_capacity(cap);
        pairs.extend(current.iter().cloned());
        let mut index = FxHashSet::default();
        index.reserve(cap);
        index.extend(current.iter().cloned());
        Self { pairs, index, changed: Vec::new(), changed_index: FxHashSet::default() }
    }

    fn mark_changed(&mut self, pair: PairRef) {
        if self.changed_index.insert(pair.clone()) {
            self.changed.push(pair);
        }
    }

    /// Returns true iff no equal pair was present. An equal pair is replaced in
    /// place and does not count as a change.
    pub fn add(&mut self, pair: Arc<dyn Pair>) -> bool {
        let pair = PairRef(pair);
        if self.index.contains(&pair) {
            if let Some(slot) = self.pairs.iter_mut().find(|p| **p == pair) {
                *slot = pair.clone();
            }
            self.index.replace(pair);
            return false;
        }
        self.index.insert(pair.clone());
        self.pairs.push(pair.clone());
        self.mark_changed(pair);
        true
    }

    /// Returns false when no equal pair was present (nothing changes then).
    pub fn remove(&mut self, pair: Arc<dyn Pair>) -> bool {
        let pair = PairRef(pair);
        if !self.index.remove(&pair) {
            return false;
        }
        self.pairs.retain(|p| *p != pair);
        self.mark_changed(pair);
        true
    }

    /// Replace the whole content. Changed pairs are the symmetric difference.
    pub fn set_all(&mut self, pairs: Vec<Arc<dyn Pair>>) {
        let mut next = Vec::with_capacity(pairs.len());
        let mut next_index = FxHashSet::default();
        for pair in pairs {
            let pair = PairRef(pair);
            if next_index.insert(pair.clone()) {
                next.push(pair);
            }
        }
        let removed: Vec<PairRef> = self.pairs.iter().filter(|p| !next_index.contains(*p)).cloned().collect();
        let added: Vec<PairRef> = next.iter().filter(|p| !self.index.contains(*p)).cloned().collect();
        for pair in removed.into_iter().chain(added) {
            self.mark_changed(pair);
        }
        self.pairs = next;
        self.index = next_index;
    }

    pub fn len(&self) -> usize { self.pairs.len() }
    pub fn is_empty(&self) -> bool { self.pairs.is_empty() }

    pub(crate) fn finish(self) -> (Vec<PairRef>, Vec<PairRef>) { (self.pairs, self.changed) }
}

/// Pairs kept in insertion order; readers work on lock-free snapshots.
pub struct SetStorage<R> {
    content: ArcSwap<Vec<PairRef>>,
    results: Mutex<FxHashMap<TypeTag, Weak<R>>>,
}

impl<R: TrackedResult> Default for SetStorage<R> {
    fn default() -> Self { Self::new() }
}

impl<R: TrackedResult> SetStorage<R> {
    pub fn new() -> Self {
        Self { content: ArcSwap::from_pointee(Vec::new()), results: Mutex::new(FxHashMap::default()) }
    }

    pub fn len(&self) -> usize { self.content.load().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Snapshot the content into a fresh working set.
    pub fn begin_transaction(&self, ensure: isize) -> Transaction {
        Transaction::new(ensure, &self.content.load())
    }

    /// Install the transaction's content and return the live results whose
    /// type overlaps a changed pair, with their caches already cleared.
    pub fn end_transaction(&self, tx: Transaction) -> Vec<Arc<R>> {
        let (content, changed) = tx.finish();
        let count = content.len();
        self.content.store(Arc::new(content));
        metrics::gauge!("lookup_pairs", count as f64);
        if changed.is_empty() {
            return Vec::new();
        }

        let changed_tags: FxHashSet<TypeTag> = changed.iter().map(|p| p.0.type_tag()).collect();
        let mut affected = Vec::new();
        let mut results = self.results.lock();
        results.retain(|_, weak| weak.strong_count() > 0);
        for (tag, weak) in results.iter() {
            if !changed_tags.iter().any(|changed| changed.is_assignable_to(*tag)) {
                continue;
            }
            if let Some(result) = weak.upgrade() {
                result.clear_cache();
                affected.push(result);
            }
        }
        debug!(pairs = count, changed = changed.len(), affected = affected.len(), "transaction ended");
        affected
    }

    /// Pairs assignable to `tag`, evaluated over the content as of this call.
    pub fn lookup(&self, tag: TypeTag) -> impl Iterator<Item = Arc<dyn Pair>> {
        let snapshot = self.content.load_full();
        (0..snapshot.len()).filter_map(move |i| {
            let pair = &snapshot[i].0;
            if pair.type_tag().is_assignable_to(tag) { Some(Arc::clone(pair)) } else { None }
        })
    }

    pub fn register_result(&self, result: &Arc<R>) {
        self.results.lock().insert(result.tag(), Arc::downgrade(result));
    }

    pub fn find_result(&self, tag: TypeTag) -> Option<Arc<R>> {
        self.results.lock().get(&tag).and_then(Weak::upgrade)
    }

    /// Find the live result for `tag` or register the one `make` builds, as a
    /// single step so concurrent queries agree on one result.
    pub fn find_or_register(&self, tag: TypeTag, make: impl FnOnce() -> Arc<R>) -> Arc<R> {
        let mut results = self.results.lock();
        if let Some(existing) = results.get(&tag).and_then(Weak::upgrade) {
            return existing;
        }
        results.retain(|_, weak| weak.strong_count() > 0);
        let result = make();
        results.insert(tag, Arc::downgrade(&result));
        result
    }

    pub fn tracked_results(&self) -> usize {
        self.results.lock().values().filter(|w| w.strong_count() > 0).count()
    }
}
