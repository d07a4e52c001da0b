//! The consumer-facing lookup contract.

use std::sync::Arc;

use crate::item::Item;
use crate::result::{Instances, LookupResult};
use crate::types::{self, Instance, TypeTag};

/// A registry permitting clients to find instances of services.
///
/// Queries are by [`TypeTag`]; a query matches every item whose concrete type
/// is assignable to the tag. Absence is a normal value, never an error. Typed
/// convenience methods live on [`LookupExt`].
pub trait Lookup: Send + Sync {
    /// Live result for `tag`. Repeated calls return the same result object for
    /// as long as some caller keeps it alive.
    fn lookup_result(&self, tag: TypeTag) -> Arc<dyn LookupResult>;

    /// First matching instance.
    fn lookup_instance(&self, tag: TypeTag) -> Option<Instance> {
        self.lookup_item(tag).and_then(|item| item.instance())
    }

    /// First matching item.
    fn lookup_item(&self, tag: TypeTag) -> Option<Arc<dyn Item>> {
        self.lookup_result(tag).all_items().first().cloned()
    }

    /// Every matching instance. May contain duplicates.
    fn lookup_instances(&self, tag: TypeTag) -> Instances {
        self.lookup_result(tag).all_instances()
    }
}

/// Something capable of and willing to provide a lookup.
pub trait LookupProvider: Send + Sync {
    fn get_lookup(&self) -> Arc<dyn Lookup>;
}

/// Typed queries over any [`Lookup`].
pub trait LookupExt: Lookup {
    fn lookup<Q: ?Sized + 'static>(&self) -> Option<Arc<Q>> {
        let instance = self.lookup_instance(TypeTag::of::<Q>())?;
        types::cast::<Q>(&instance)
    }

    fn lookup_all<Q: ?Sized + 'static>(&self) -> Vec<Arc<Q>> {
        self.lookup_instances(TypeTag::of::<Q>()).iter().filter_map(types::cast::<Q>).collect()
    }

    fn lookup_item_of<Q: ?Sized + 'static>(&self) -> Option<Arc<dyn Item>> {
        self.lookup_item(TypeTag::of::<Q>())
    }

    fn result<Q: ?Sized + 'static>(&self) -> Arc<dyn LookupResult> {
        self.lookup_result(TypeTag::of::<Q>())
    }
}

impl<L: Lookup + ?Sized> LookupExt for L {}

/// Whether two lookup handles are the same lookup object.
pub fn same_lookup(a: &Arc<dyn Lookup>, b: &Arc<dyn Lookup>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
