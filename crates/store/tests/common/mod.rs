#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lookups_core::{implements, Listener};

pub trait Parent: Send + Sync {
    fn serial(&self) -> u32;
}

pub trait Child: Parent {}

pub struct ParentObject(pub u32);
pub struct ChildObject(pub u32);
pub struct OtherObject(pub u32);

impl Parent for ParentObject {
    fn serial(&self) -> u32 { self.0 }
}

impl Parent for ChildObject {
    fn serial(&self) -> u32 { self.0 }
}

impl Child for ChildObject {}

pub fn register() {
    implements!(ParentObject => dyn Parent);
    implements!(ChildObject => dyn Parent, dyn Child);
    implements!(OtherObject);
}

pub fn counting(hits: &Arc<AtomicUsize>) -> Listener {
    let hits = Arc::clone(hits);
    Listener::new(move |_| {
        hits.fetch_add(1, Ordering::SeqCst);
    })
}

pub fn serials<T: Parent + ?Sized>(all: &[Arc<T>]) -> Vec<u32> { all.iter().map(|p| p.serial()).collect() }
