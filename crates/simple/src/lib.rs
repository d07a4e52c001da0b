//! Lookups whose content never changes after construction.
//!
//! Their results ignore listeners: there is nothing to be notified about.

#![forbid(unsafe_code)]

pub mod entry_point;
pub mod fixed;

pub use entry_point::{EntryPointLookup, ServiceRegistration};
pub use fixed::{EmptyLookup, FixedLookup, SingletonLookup, StaticResult};

pub use inventory;

#[doc(hidden)]
pub use lookups_core as __core;
