//! The process-wide default lookup.

use std::sync::Arc;

use lookups_core::{types, Lookup, LookupConfig, LookupExt, LookupProvider, TypeTag};
use lookups_proxy::{DelegatedLookup, ProxyLookup};
use lookups_simple::EntryPointLookup;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info};

#[derive(Default)]
struct DefaultState {
    lookup: Option<Arc<dyn Lookup>>,
    provider: Option<Arc<dyn LookupProvider>>,
}

static DEFAULT: Lazy<Mutex<DefaultState>> = Lazy::new(|| Mutex::new(DefaultState::default()));

/// The global lookup, resolved from the `LOOKUPS_DEFAULT_GROUP` entry-point
/// group on first use.
pub fn default_lookup() -> Arc<dyn Lookup> { default_lookup_for(&LookupConfig::from_env().default_group) }

/// The global lookup; `group` is only consulted when nothing is resolved yet.
///
/// Resolution, first hit wins:
/// 1. a provider set earlier: its current lookup;
/// 2. a lookup set or resolved earlier;
/// 3. a member of `group` usable both as a lookup and a provider: the
///    provider's lookup, and it stays the provider from then on;
/// 4. a member of `group` usable as a lookup;
/// 5. a member of `group` usable as a provider, wrapped in a [`DelegatedLookup`];
/// 6. a [`ProxyLookup`] over the whole group.
pub fn default_lookup_for(group: &str) -> Arc<dyn Lookup> {
    if let Some(found) = current() {
        return found;
    }
    let (lookup, provider) = resolve(group);
    let mut state = DEFAULT.lock();
    if state.lookup.is_none() && state.provider.is_none() {
        state.lookup = Some(lookup);
        state.provider = provider;
    }
    drop(state);
    current().unwrap_or_else(|| {
        let fallback: Arc<dyn Lookup> = Arc::new(ProxyLookup::default());
        fallback
    })
}

fn current() -> Option<Arc<dyn Lookup>> {
    let (lookup, provider) = {
        let state = DEFAULT.lock();
        (state.lookup.clone(), state.provider.clone())
    };
    match provider {
        Some(provider) => Some(provider.get_lookup()),
        None => lookup,
    }
}

fn resolve(group: &str) -> (Arc<dyn Lookup>, Option<Arc<dyn LookupProvider>>) {
    let entry_points = EntryPointLookup::new(group);
    if let Some(instance) = entry_points.lookup_instance(TypeTag::of::<dyn Lookup>()) {
        if let Some(lookup) = types::cast::<dyn Lookup>(&instance) {
            let provider = types::cast::<dyn LookupProvider>(&instance);
            info!(group, provider = provider.is_some(), "default lookup from entry point");
            return (lookup, provider);
        }
    }
    if let Some(provider) = entry_points.lookup::<dyn LookupProvider>() {
        info!(group, "default lookup delegating to entry-point provider");
        let delegated: Arc<dyn Lookup> = Arc::new(DelegatedLookup::new(provider));
        return (delegated, None);
    }
    debug!(group, services = entry_points.len(), "default lookup proxies the entry-point group");
    let source: Arc<dyn Lookup> = Arc::new(entry_points);
    let proxy: Arc<dyn Lookup> = Arc::new(ProxyLookup::new(vec![source]));
    (proxy, None)
}

/// Replace the default lookup. A provider set earlier is dropped.
pub fn set_default_lookup(lookup: Arc<dyn Lookup>) {
    let mut state = DEFAULT.lock();
    state.lookup = Some(lookup);
    state.provider = None;
}

/// Make `provider` answer every later [`default_lookup`] call.
pub fn set_default_provider(provider: Arc<dyn LookupProvider>) {
    DEFAULT.lock().provider = Some(provider);
}

/// Forget everything so the next call resolves again.
pub fn reset_default() {
    let mut state = DEFAULT.lock();
    state.lookup = None;
    state.provider = None;
}
