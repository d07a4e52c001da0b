//! Lookups core: type tags, the item/result/lookup contracts and listener
//! plumbing shared by every lookup implementation.
//!
//! A lookup is a type-indexed service registry. Producers register instances,
//! consumers query by type and may listen for changes; neither side knows the
//! other.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod executor;
pub mod item;
pub mod lookup;
pub mod result;
pub mod types;

pub use config::{LookupConfig, DEFAULT_GROUP};
pub use error::{LookupError, Result};
pub use executor::{Executor, Task, TokioExecutor};
pub use item::{InstanceItem, Item};
pub use lookup::{same_lookup, Lookup, LookupExt, LookupProvider};
pub use result::{same_result, Classes, Instances, Items, Listener, ListenerList, LookupResult};
pub use types::{Instance, Object, TypeTag};

pub mod prelude {
    pub use super::{
        Instance, InstanceItem, Item, Listener, Lookup, LookupError, LookupExt, LookupProvider,
        LookupResult, Object, TypeTag,
    };
}
