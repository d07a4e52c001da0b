//! Runtime type tags and the process-wide assignability table.
//!
//! Rust has no class hierarchy to walk at runtime, so "is an instance of `T`
//! usable as a `Q`" is answered by an explicit table of casters. A caster turns
//! an `Arc<T>` into an `Arc<Q>`; `Q` is usually a trait object the concrete type
//! implements. Every type is assignable to itself and to [`Object`].
//!
//! ```ignore
//! trait Greeter: Send + Sync { fn greet(&self) -> String; }
//! struct English;
//! impl Greeter for English { fn greet(&self) -> String { "hello".into() } }
//!
//! lookups_core::implements!(English => dyn Greeter);
//! ```

#![forbid(unsafe_code)]

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

/// The universal query type: every registered instance is assignable to it.
pub type Object = dyn Any + Send + Sync;

/// A type-erased, shared service object.
pub type Instance = Arc<Object>;

type Caster = Arc<dyn Fn(Instance) -> Option<Box<dyn Any>> + Send + Sync>;

static TYPE_TABLE: Lazy<RwLock<TypeTable>> = Lazy::new(|| RwLock::new(TypeTable::default()));

/// Runtime tag naming a concrete type, a trait-object type or [`Object`].
///
/// Equality and hashing only consider the [`TypeId`]; the name is for humans.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self { id: TypeId::of::<T>(), name: std::any::type_name::<T>() }
    }

    pub fn object() -> Self { Self::of::<Object>() }

    pub fn id(&self) -> TypeId { self.id }
    pub fn name(&self) -> &'static str { self.name }
    pub fn is_object(&self) -> bool { self.id == TypeId::of::<Object>() }

    /// Whether an item of this type matches a query for `target`.
    pub fn is_assignable_to(&self, target: TypeTag) -> bool {
        if *self == target || target.is_object() {
            return true;
        }
        TYPE_TABLE.read().casts.contains_key(&(self.id, target.id))
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) { self.id.hash(state) }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "TypeTag({})", self.name) }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name) }
}

/// Casters keyed by `(concrete, target)` type ids.
#[derive(Default)]
struct TypeTable {
    casts: FxHashMap<(TypeId, TypeId), Caster>,
}

/// Make `T` castable to itself. Called implicitly whenever an instance of `T` is
/// wrapped into an item.
pub fn register_type<T: Any + Send + Sync>() {
    register_cast::<T, T>(|it| it);
}

/// Declare that instances of `T` are assignable to `Q`. Idempotent.
pub fn register_cast<T, Q>(cast: fn(Arc<T>) -> Arc<Q>)
where
    T: Any + Send + Sync,
    Q: ?Sized + 'static,
{
    let key = (TypeId::of::<T>(), TypeId::of::<Q>());
    if TYPE_TABLE.read().casts.contains_key(&key) {
        return;
    }
    let caster: Caster = Arc::new(move |instance: Instance| {
        let concrete = instance.downcast::<T>().ok()?;
        Some(Box::new(cast(concrete)) as Box<dyn Any>)
    });
    let mut table = TYPE_TABLE.write();
    if !table.casts.contains_key(&key) {
        trace!(from = std::any::type_name::<T>(), to = std::any::type_name::<Q>(), "register cast");
        table.casts.insert(key, caster);
    }
}

/// Turn a type-erased instance into an `Arc<Q>`, if its concrete type is
/// assignable to `Q`.
pub fn cast<Q: ?Sized + 'static>(instance: &Instance) -> Option<Arc<Q>> {
    // Q == Object needs no table entry
    let erased: Box<dyn Any> = Box::new(Arc::clone(instance));
    if let Ok(same) = erased.downcast::<Arc<Q>>() {
        return Some(*same);
    }
    let concrete = Any::type_id(&**instance);
    let caster = TYPE_TABLE.read().casts.get(&(concrete, TypeId::of::<Q>())).cloned()?;
    caster(Arc::clone(instance))?.downcast::<Arc<Q>>().ok().map(|arc| *arc)
}

/// Declare assignability of a concrete type to one or more targets.
///
/// `implements!(T)` only registers `T` itself; `implements!(T => dyn A, dyn B)`
/// also registers casts to each target. Targets are not transitive: list every
/// trait the type should be found under.
#[macro_export]
macro_rules! implements {
    ($ty:ty) => {
        $crate::types::register_type::<$ty>()
    };
    ($ty:ty => $($target:ty),+ $(,)?) => {{
        $crate::types::register_type::<$ty>();
        $(
            $crate::types::register_cast::<$ty, $target>(
                |it: ::std::sync::Arc<$ty>| -> ::std::sync::Arc<$target> { it },
            );
        )+
    }};
}
