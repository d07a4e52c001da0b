//! Lookups: a type-indexed service registry.
//!
//! Producers register instances in a lookup; consumers query it by type and
//! may listen for changes. Neither side references the other.
//!
//! ```ignore
//! use lookups::prelude::*;
//!
//! let (content, lookup) = Lookups::generic()?;
//! content.add(Arc::new(English))?;
//! let greeter = lookup.lookup::<dyn Greeter>();
//! ```

#![forbid(unsafe_code)]

pub mod default;
pub mod factory;

pub use default::{default_lookup, default_lookup_for, reset_default, set_default_lookup, set_default_provider};
pub use factory::Lookups;

pub use lookups_core::{
    implements, same_lookup, same_result, types, Classes, Executor, Instance, InstanceItem, Instances, Item, Items,
    Listener, Lookup, LookupConfig, LookupError, LookupExt, LookupProvider, LookupResult, Object, Result, Task,
    TokioExecutor, TypeTag,
};
pub use lookups_proxy::{DelegatedLookup, ProxyLookup};
pub use lookups_simple::{service, EmptyLookup, EntryPointLookup, FixedLookup, SingletonLookup};
pub use lookups_store::{Content, Convertor, GenericLookup, InstanceContent, LookupHooks};

pub mod prelude {
    pub use super::{
        Convertor, GenericLookup, InstanceContent, InstanceItem, Listener, Lookup, LookupExt, LookupProvider,
        LookupResult, Lookups, TypeTag,
    };
    pub use std::sync::Arc;
}
