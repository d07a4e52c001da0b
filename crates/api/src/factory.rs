use std::any::Any;
use std::sync::Arc;

use lookups_core::{Executor, InstanceItem, Lookup, LookupProvider, Result};
use lookups_proxy::{DelegatedLookup, ProxyLookup};
use lookups_simple::{EmptyLookup, EntryPointLookup, FixedLookup, SingletonLookup};
use lookups_store::{GenericLookup, InstanceContent};

/// Constructors for the stock lookups.
pub struct Lookups;

impl Lookups {
    /// A modifiable lookup and the content that modifies it.
    pub fn generic() -> Result<(InstanceContent, GenericLookup)> { Self::attach(InstanceContent::new()) }

    /// Like [`Lookups::generic`], notifying listeners through `executor`.
    pub fn generic_with_executor(executor: Arc<dyn Executor>) -> Result<(InstanceContent, GenericLookup)> {
        Self::attach(InstanceContent::with_executor(executor))
    }

    fn attach(content: InstanceContent) -> Result<(InstanceContent, GenericLookup)> {
        let lookup = GenericLookup::new(&content)?;
        Ok((content, lookup))
    }

    pub fn empty() -> EmptyLookup { EmptyLookup::new() }

    pub fn singleton<T: Any + Send + Sync>(member: Arc<T>) -> SingletonLookup { SingletonLookup::new(member) }

    pub fn singleton_with_id<T: Any + Send + Sync>(member: Arc<T>, id: impl Into<String>) -> SingletonLookup {
        SingletonLookup::with_id(member, id)
    }

    pub fn fixed(items: impl IntoIterator<Item = InstanceItem>) -> FixedLookup { FixedLookup::new(items) }

    pub fn proxy(lookups: Vec<Arc<dyn Lookup>>) -> ProxyLookup { ProxyLookup::new(lookups) }

    pub fn delegated(provider: Arc<dyn LookupProvider>) -> DelegatedLookup { DelegatedLookup::new(provider) }

    pub fn entry_points(group: &str) -> EntryPointLookup { EntryPointLookup::new(group) }
}
