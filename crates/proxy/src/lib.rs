//! Lookups that sit above other lookups and republish their results under a
//! stable identity.
//!
//! - [`DelegatedLookup`] forwards to one backing lookup that a provider can
//!   swap at any time.
//! - [`ProxyLookup`] merges an ordered, mutable list of backing lookups.

#![forbid(unsafe_code)]

pub mod delegated;
pub mod proxy;

pub use delegated::{DelegatedLookup, DelegatedResult};
pub use proxy::{ProxyLookup, ProxyResult};
