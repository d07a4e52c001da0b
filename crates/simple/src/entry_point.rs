//! Lookups discovered from statically registered services.
//!
//! A service is declared once, anywhere in the final binary, with [`service!`]:
//!
//! ```ignore
//! lookups_simple::service!("codecs", Gzip => [dyn Codec], Gzip::default());
//! ```
//!
//! [`EntryPointLookup::new`] then instantiates every service of a group.

use std::sync::Arc;

use lookups_core::{Instance, InstanceItem, Item, Lookup, LookupResult, TypeTag};
use tracing::debug;

use crate::fixed::FixedLookup;

/// One statically registered service constructor.
pub struct ServiceRegistration {
    pub group: &'static str,
    pub name: &'static str,
    pub factory: fn() -> Instance,
    pub tag: fn() -> TypeTag,
    /// Registers the service type's casts.
    pub casts: fn(),
}

inventory::collect!(ServiceRegistration);

/// Declare a service in an entry-point group.
///
/// `service!(group, Type => [dyn TraitA, dyn TraitB], constructor_expr)`; the
/// target list may be empty.
#[macro_export]
macro_rules! service {
    ($group:expr, $ty:ty => [$($target:ty),* $(,)?], $factory:expr) => {
        const _: () = {
            fn factory() -> $crate::__core::Instance {
                let value: $ty = $factory;
                ::std::sync::Arc::new(value)
            }
            fn tag() -> $crate::__core::TypeTag { $crate::__core::TypeTag::of::<$ty>() }
            fn casts() {
                $crate::__core::types::register_type::<$ty>();
                $(
                    $crate::__core::types::register_cast::<$ty, $target>(
                        |it: ::std::sync::Arc<$ty>| -> ::std::sync::Arc<$target> { it },
                    );
                )*
            }
            $crate::inventory::submit! {
                $crate::ServiceRegistration { group: $group, name: stringify!($ty), factory, tag, casts }
            }
        };
    };
}

/// Registrations of `group`, in discovery order.
pub fn registrations(group: &str) -> impl Iterator<Item = &'static ServiceRegistration> + '_ {
    inventory::iter::<ServiceRegistration>.into_iter().filter(move |reg| reg.group == group)
}

/// Fixed lookup over every service registered in one group.
///
/// Services are instantiated once, when the lookup is built. An unknown group
/// yields an empty lookup.
pub struct EntryPointLookup {
    group: String,
    inner: FixedLookup,
}

impl EntryPointLookup {
    pub fn new(group: &str) -> Self {
        let items: Vec<InstanceItem> = registrations(group)
            .map(|reg| {
                (reg.casts)();
                InstanceItem::from_erased((reg.factory)(), (reg.tag)(), Some(format!("{}:{}", reg.group, reg.name)))
            })
            .collect();
        debug!(group, services = items.len(), "entry points loaded");
        Self { group: group.to_string(), inner: FixedLookup::new(items) }
    }

    pub fn group(&self) -> &str { &self.group }
    pub fn len(&self) -> usize { self.inner.len() }
    pub fn is_empty(&self) -> bool { self.inner.is_empty() }
}

impl Lookup for EntryPointLookup {
    fn lookup_result(&self, tag: TypeTag) -> Arc<dyn LookupResult> { self.inner.lookup_result(tag) }
    fn lookup_item(&self, tag: TypeTag) -> Option<Arc<dyn Item>> { self.inner.lookup_item(tag) }
}

impl std::fmt::Debug for EntryPointLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPointLookup").field("group", &self.group).field("services", &self.len()).finish()
    }
}
