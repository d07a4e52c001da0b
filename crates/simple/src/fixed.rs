use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use lookups_core::{Classes, InstanceItem, Instances, Item, Items, Listener, Lookup, LookupResult, TypeTag};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

/// Result over a fixed list of items. Listeners are accepted and never called.
pub struct StaticResult {
    items: Items,
    classes: Classes,
    instances: Instances,
}

impl StaticResult {
    pub fn new(items: Vec<Arc<dyn Item>>) -> Self {
        let classes: FxHashSet<TypeTag> = items.iter().map(|item| item.type_tag()).collect();
        let instances: Vec<_> = items.iter().filter_map(|item| item.instance()).collect();
        Self { items: items.into(), classes: Arc::new(classes), instances: instances.into() }
    }

    pub fn empty() -> Self { Self::new(Vec::new()) }
}

impl LookupResult for StaticResult {
    fn add_listener(&self, _listener: &Listener) {}
    fn remove_listener(&self, _listener: &Listener) {}
    fn all_classes(&self) -> Classes { Arc::clone(&self.classes) }
    fn all_instances(&self) -> Instances { Arc::clone(&self.instances) }
    fn all_items(&self) -> Items { Arc::clone(&self.items) }
}

impl fmt::Debug for StaticResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticResult").field("items", &self.items.len()).finish()
    }
}

/// Lookup that contains nothing.
pub struct EmptyLookup {
    empty: Arc<StaticResult>,
}

impl Default for EmptyLookup {
    fn default() -> Self { Self::new() }
}

impl EmptyLookup {
    pub fn new() -> Self { Self { empty: Arc::new(StaticResult::empty()) } }
}

impl Lookup for EmptyLookup {
    fn lookup_result(&self, _tag: TypeTag) -> Arc<dyn LookupResult> { self.empty.clone() }
    fn lookup_item(&self, _tag: TypeTag) -> Option<Arc<dyn Item>> { None }
}

impl fmt::Debug for EmptyLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("EmptyLookup") }
}

/// Lookup holding exactly one member.
pub struct SingletonLookup {
    item: Arc<dyn Item>,
    matching: Arc<StaticResult>,
    empty: Arc<StaticResult>,
}

impl SingletonLookup {
    pub fn new<T: Any + Send + Sync>(member: Arc<T>) -> Self { Self::from_item(InstanceItem::new(member)) }

    pub fn with_id<T: Any + Send + Sync>(member: Arc<T>, id: impl Into<String>) -> Self {
        Self::from_item(InstanceItem::with_id(member, Some(id.into())))
    }

    pub fn from_item(item: InstanceItem) -> Self {
        let item: Arc<dyn Item> = Arc::new(item);
        let matching = Arc::new(StaticResult::new(vec![Arc::clone(&item)]));
        Self { item, matching, empty: Arc::new(StaticResult::empty()) }
    }

    fn matches(&self, tag: TypeTag) -> bool { self.item.type_tag().is_assignable_to(tag) }
}

impl Lookup for SingletonLookup {
    fn lookup_result(&self, tag: TypeTag) -> Arc<dyn LookupResult> {
        if self.matches(tag) { self.matching.clone() } else { self.empty.clone() }
    }

    fn lookup_item(&self, tag: TypeTag) -> Option<Arc<dyn Item>> {
        self.matches(tag).then(|| Arc::clone(&self.item))
    }
}

impl fmt::Debug for SingletonLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "SingletonLookup[{}]", self.item.id()) }
}

/// Lookup over an immutable list of members, kept in the given order.
pub struct FixedLookup {
    items: Vec<Arc<dyn Item>>,
    results: Mutex<FxHashMap<TypeTag, Weak<StaticResult>>>,
}

impl FixedLookup {
    pub fn new(items: impl IntoIterator<Item = InstanceItem>) -> Self {
        Self {
            items: items.into_iter().map(|item| Arc::new(item) as Arc<dyn Item>).collect(),
            results: Mutex::new(FxHashMap::default()),
        }
    }

    /// Members of one type.
    pub fn of<T: Any + Send + Sync>(members: impl IntoIterator<Item = Arc<T>>) -> Self {
        Self::new(members.into_iter().map(InstanceItem::new))
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    fn matching(&self, tag: TypeTag) -> impl Iterator<Item = &Arc<dyn Item>> {
        self.items.iter().filter(move |item| item.type_tag().is_assignable_to(tag))
    }
}

impl Lookup for FixedLookup {
    fn lookup_result(&self, tag: TypeTag) -> Arc<dyn LookupResult> {
        let mut results = self.results.lock();
        if let Some(existing) = results.get(&tag).and_then(Weak::upgrade) {
            return existing;
        }
        results.retain(|_, weak| weak.strong_count() > 0);
        let result = Arc::new(StaticResult::new(self.matching(tag).cloned().collect()));
        results.insert(tag, Arc::downgrade(&result));
        result
    }

    fn lookup_item(&self, tag: TypeTag) -> Option<Arc<dyn Item>> { self.matching(tag).next().cloned() }
}

impl fmt::Debug for FixedLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedLookup").field("items", &self.items.len()).finish()
    }
}
