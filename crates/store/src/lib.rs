//! Lookups store: the generic, content-backed lookup.
//!
//! An owner creates an [`InstanceContent`], builds a [`GenericLookup`] over it
//! and hands the lookup to consumers. Only the content holder can change what
//! the lookup contains.
//!
//! ```ignore
//! let content = InstanceContent::new();
//! let lookup = GenericLookup::new(&content)?;
//! content.add(Arc::new(MyService::default()))?;
//! let svc = lookup.lookup::<MyService>();
//! ```

#![forbid(unsafe_code)]

pub mod content;
pub mod convert;
pub mod engine;
pub mod storage;

pub use content::{Content, InstanceContent};
pub use convert::{Convertor, ConvertingItem};
pub use engine::{GenericLookup, GlResult, LookupHooks};
pub use storage::{Pair, SetStorage, TrackedResult, Transaction};
