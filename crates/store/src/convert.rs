//! Lazily converted lookup entries.
//!
//! Register a lightweight key plus a [`Convertor`]; the heavy value is only
//! built when someone asks a result for its instances.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use lookups_core::{types, Instance, Item, LookupError, Result, TypeTag};
use parking_lot::Mutex;
use rustc_hash::FxHasher;
use tracing::trace;

use crate::storage::Pair;

/// Turns keys of type `K` into values of type `V` on demand.
pub trait Convertor<K, V: 'static>: Send + Sync {
    /// Build the value for `key`. Called at most once per live value.
    fn convert(&self, key: &K) -> Arc<V>;

    /// Type reported for `key` before conversion; must be `V` or a type
    /// `V` is assignable to.
    fn type_of(&self, key: &K) -> TypeTag {
        let _ = key;
        TypeTag::of::<V>()
    }

    fn id(&self, key: &K) -> String;

    fn display_name(&self, key: &K) -> String;

    /// Keys rejected here never become lookup members.
    fn validate(&self, key: &K) -> bool {
        let _ = key;
        true
    }
}

/// Item holding a key and producing its value through a convertor.
///
/// The produced value is held weakly: it is rebuilt after every holder of a
/// previous conversion dropped it. Two converting items are equal when their
/// keys are.
pub struct ConvertingItem<K, V: 'static> {
    key: K,
    convertor: Arc<dyn Convertor<K, V>>,
    converted: Mutex<Weak<V>>,
}

impl<K, V> ConvertingItem<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Any + Send + Sync,
{
    pub fn new(key: K, convertor: Arc<dyn Convertor<K, V>>) -> Result<Self> {
        if !convertor.validate(&key) {
            return Err(LookupError::InvalidArgument(format!(
                "key {} cannot be a lookup member",
                convertor.display_name(&key)
            )));
        }
        Ok(Self { key, convertor, converted: Mutex::new(Weak::new()) })
    }

    pub fn key(&self) -> &K { &self.key }

    /// Whether a converted value is currently alive.
    pub fn is_converted(&self) -> bool { self.converted.lock().strong_count() > 0 }

    fn value(&self) -> Arc<V> {
        let mut converted = self.converted.lock();
        if let Some(value) = converted.upgrade() {
            return value;
        }
        trace!(id = %self.convertor.id(&self.key), "converting");
        let value = self.convertor.convert(&self.key);
        types::register_type::<V>();
        *converted = Arc::downgrade(&value);
        value
    }
}

impl<K, V> Item for ConvertingItem<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Any + Send + Sync,
{
    fn display_name(&self) -> String { self.convertor.display_name(&self.key) }

    fn id(&self) -> String { self.convertor.id(&self.key) }

    fn instance(&self) -> Option<Instance> { Some(self.value() as Instance) }

    fn type_tag(&self) -> TypeTag {
        if self.is_converted() { TypeTag::of::<V>() } else { self.convertor.type_of(&self.key) }
    }
}

impl<K, V> Pair for ConvertingItem<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Any + Send + Sync,
{
    fn as_any(&self) -> &dyn Any { self }

    fn pair_eq(&self, other: &dyn Pair) -> bool {
        other.as_any().downcast_ref::<Self>().map_or(false, |other| other.key == self.key)
    }

    fn pair_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        TypeId::of::<Self>().hash(&mut hasher);
        self.key.hash(&mut hasher);
        hasher.finish()
    }

    fn into_item(self: Arc<Self>) -> Arc<dyn Item> { self }
}

impl<K, V> fmt::Debug for ConvertingItem<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Any + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertingItem").field("id", &self.id()).field("converted", &self.is_converted()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Heavy(u32);

    #[derive(Default)]
    struct Builder {
        calls: AtomicUsize,
    }

    impl Convertor<u32, Heavy> for Builder {
        fn convert(&self, key: &u32) -> Arc<Heavy> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Arc::new(Heavy(*key * 10))
        }
        fn id(&self, key: &u32) -> String { format!("heavy-{key}") }
        fn display_name(&self, key: &u32) -> String { format!("Heavy #{key}") }
        fn validate(&self, key: &u32) -> bool { *key != 0 }
    }

    fn item(key: u32, builder: &Arc<Builder>) -> ConvertingItem<u32, Heavy> {
        let convertor: Arc<dyn Convertor<u32, Heavy>> = Arc::clone(builder) as Arc<dyn Convertor<u32, Heavy>>;
        ConvertingItem::new(key, convertor).expect("valid key")
    }

    #[test]
    fn converts_once_per_live_value() {
        let builder = Arc::new(Builder::default());
        let it = item(4, &builder);
        assert_eq!(it.type_tag(), TypeTag::of::<Heavy>());
        assert_eq!(it.id(), "heavy-4");
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);

        let first = it.instance().expect("converted");
        let again = it.instance().expect("converted");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.downcast_ref::<Heavy>().map(|h| h.0), Some(40));

        drop((first, again));
        assert!(!it.is_converted());
        let _rebuilt = it.instance();
        assert_eq!(builder.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn equality_is_by_key() {
        let builder = Arc::new(Builder::default());
        let (a, b, c) = (item(1, &builder), item(1, &builder), item(2, &builder));
        assert!(a.pair_eq(&b));
        assert_eq!(a.pair_hash(), b.pair_hash());
        assert!(!a.pair_eq(&c));
    }

    #[test]
    fn rejected_keys_are_invalid_arguments() {
        let convertor: Arc<dyn Convertor<u32, Heavy>> = Arc::new(Builder::default());
        let err = ConvertingItem::new(0, convertor).err();
        assert!(matches!(err, Some(LookupError::InvalidArgument(_))));
    }
}
