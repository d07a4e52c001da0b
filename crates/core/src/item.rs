//! Items: one registered instance plus its type, id and display name.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::types::{self, Instance, TypeTag};

/// A single entry of a lookup result.
///
/// Gives unified access to the instance, its concrete type, a persistent id and
/// a human readable name. Implementations may produce the instance lazily.
pub trait Item: Send + Sync {
    /// Human presentable name, e.g. for listing what a result contains.
    fn display_name(&self) -> String;

    /// Persistent identifier, unique within the containing lookup.
    fn id(&self) -> String;

    /// The instance itself, or `None` if it cannot be produced.
    fn instance(&self) -> Option<Instance>;

    /// Concrete type of the instance.
    fn type_tag(&self) -> TypeTag;
}

impl dyn Item {
    /// Typed view of [`Item::instance`].
    pub fn instance_as<Q: ?Sized + 'static>(&self) -> Option<Arc<Q>> {
        self.instance().and_then(|instance| types::cast::<Q>(&instance))
    }
}

impl fmt::Debug for dyn Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item").field("id", &self.id()).field("type", &self.type_tag()).finish()
    }
}

/// Item wrapping an already existing instance.
///
/// Two `InstanceItem`s are the same entry when they wrap the same allocation.
#[derive(Clone)]
pub struct InstanceItem {
    instance: Instance,
    tag: TypeTag,
    id: Option<String>,
}

impl InstanceItem {
    pub fn new<T: Any + Send + Sync>(instance: Arc<T>) -> Self {
        Self::with_id(instance, None)
    }

    pub fn with_id<T: Any + Send + Sync>(instance: Arc<T>, id: Option<String>) -> Self {
        types::register_type::<T>();
        Self { instance, tag: TypeTag::of::<T>(), id }
    }

    /// Wrap an already erased instance. `tag` must name its concrete type.
    pub fn from_erased(instance: Instance, tag: TypeTag, id: Option<String>) -> Self {
        Self { instance, tag, id }
    }

    pub fn erased(&self) -> &Instance { &self.instance }

    pub fn same_instance(&self, other: &Self) -> bool { Arc::ptr_eq(&self.instance, &other.instance) }

    /// Allocation address of the instance; stable while the item lives.
    pub fn address(&self) -> usize { Arc::as_ptr(&self.instance) as *const () as usize }
}

impl Item for InstanceItem {
    fn display_name(&self) -> String { self.tag.name().to_string() }

    fn id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}@{:x}", self.tag.name(), self.address()),
        }
    }

    fn instance(&self) -> Option<Instance> { Some(Arc::clone(&self.instance)) }

    fn type_tag(&self) -> TypeTag { self.tag }
}

impl PartialEq for InstanceItem {
    fn eq(&self, other: &Self) -> bool { self.same_instance(other) }
}

impl Eq for InstanceItem {}

impl std::hash::Hash for InstanceItem {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.address().hash(state) }
}

impl fmt::Debug for InstanceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceItem").field("id", &self.id()).field("type", &self.tag).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Service;

    #[test]
    fn identity_equality() {
        let a = Arc::new(Service);
        let one = InstanceItem::new(Arc::clone(&a));
        let two = InstanceItem::new(a);
        let other = InstanceItem::new(Arc::new(Service));
        assert_eq!(one, two);
        assert_ne!(one, other);
    }

    #[test]
    fn default_id_and_name() {
        let item = InstanceItem::new(Arc::new(Service));
        assert!(item.display_name().ends_with("Service"));
        assert!(item.id().contains('@'));
        let named = InstanceItem::with_id(Arc::new(Service), Some("svc".into()));
        assert_eq!(named.id(), "svc");
        let erased: &dyn Item = &named;
        assert!(erased.instance_as::<Service>().is_some());
    }
}
