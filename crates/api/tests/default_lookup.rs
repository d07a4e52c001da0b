#![forbid(unsafe_code)]

use std::sync::Arc;

use lookups::{
    default_lookup_for, reset_default, same_lookup, service, set_default_lookup, set_default_provider, Item,
    Lookup, LookupExt, LookupProvider, LookupResult, Object, SingletonLookup, TypeTag,
};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};

pub struct Marker(pub &'static str);

pub struct AppLookup(SingletonLookup);

impl Default for AppLookup {
    fn default() -> Self { Self(SingletonLookup::new(Arc::new(Marker("app")))) }
}

impl Lookup for AppLookup {
    fn lookup_result(&self, tag: TypeTag) -> Arc<dyn LookupResult> { self.0.lookup_result(tag) }
    fn lookup_item(&self, tag: TypeTag) -> Option<Arc<dyn Item>> { self.0.lookup_item(tag) }
}

/// Is a lookup itself and also provides another one.
pub struct Layered {
    own: SingletonLookup,
    provided: Arc<dyn Lookup>,
}

impl Default for Layered {
    fn default() -> Self {
        Self {
            own: SingletonLookup::new(Arc::new(Marker("own"))),
            provided: Arc::new(SingletonLookup::new(Arc::new(Marker("provided")))),
        }
    }
}

impl Lookup for Layered {
    fn lookup_result(&self, tag: TypeTag) -> Arc<dyn LookupResult> { self.own.lookup_result(tag) }
}

impl LookupProvider for Layered {
    fn get_lookup(&self) -> Arc<dyn Lookup> { Arc::clone(&self.provided) }
}

#[derive(Default)]
pub struct OnlyProvider;

impl LookupProvider for OnlyProvider {
    fn get_lookup(&self) -> Arc<dyn Lookup> { Arc::new(SingletonLookup::new(Arc::new(Marker("delegated")))) }
}

pub struct Plain;
pub struct AlsoPlain;

service!("test.default.lookup", AppLookup => [dyn Lookup], AppLookup::default());
service!("test.default.layered", Layered => [dyn Lookup, dyn LookupProvider], Layered::default());
service!("test.default.provider", OnlyProvider => [dyn LookupProvider], OnlyProvider);
service!("test.default.plain", Plain => [], Plain);
service!("test.default.plain", AlsoPlain => [], AlsoPlain);

static SERIAL: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn fresh() -> MutexGuard<'static, ()> {
    let guard = SERIAL.lock();
    reset_default();
    guard
}

fn marker(lookup: &dyn Lookup) -> Option<&'static str> { lookup.lookup::<Marker>().map(|m| m.0) }

#[test]
fn entry_point_lookup_becomes_default() {
    let _serial = fresh();
    let first = default_lookup_for("test.default.lookup");
    assert_eq!(marker(first.as_ref()), Some("app"));
    let again = default_lookup_for("test.default.plain");
    assert!(same_lookup(&first, &again), "resolved once, group ignored afterwards");
}

#[test]
fn lookup_that_is_also_provider_serves_its_provided_lookup() {
    let _serial = fresh();
    let first = default_lookup_for("test.default.layered");
    assert_eq!(marker(first.as_ref()), Some("provided"));
    let again = default_lookup_for("test.default.layered");
    assert!(same_lookup(&first, &again));
}

#[test]
fn provider_is_wrapped_in_delegating_lookup() {
    let _serial = fresh();
    let first = default_lookup_for("test.default.provider");
    assert_eq!(marker(first.as_ref()), Some("delegated"));
    assert!(same_lookup(&first, &default_lookup_for("test.default.provider")));
}

#[test]
fn plain_services_are_proxied() {
    let _serial = fresh();
    let first = default_lookup_for("test.default.plain");
    assert_eq!(first.lookup_all::<Object>().len(), 2);
    assert!(first.lookup::<Plain>().is_some());
    assert!(first.lookup::<AlsoPlain>().is_some());
}

#[test]
fn empty_group_yields_empty_default() {
    let _serial = fresh();
    let first = default_lookup_for("test.default.nothing");
    assert!(first.lookup_all::<Object>().is_empty());
    assert!(same_lookup(&first, &default_lookup_for("test.default.nothing")));
}

#[test]
fn explicit_settings_win_until_reset() {
    let _serial = fresh();
    let mine: Arc<dyn Lookup> = Arc::new(SingletonLookup::new(Arc::new(Marker("mine"))));
    set_default_lookup(Arc::clone(&mine));
    assert!(same_lookup(&default_lookup_for("test.default.lookup"), &mine));

    set_default_provider(Arc::new(OnlyProvider));
    assert_eq!(marker(default_lookup_for("test.default.lookup").as_ref()), Some("delegated"));

    reset_default();
    assert_eq!(marker(default_lookup_for("test.default.lookup").as_ref()), Some("app"));
}
