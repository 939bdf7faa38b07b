use std::sync::atomic::{AtomicUsize, Ordering};

// Shared by spans, types and symbols so that ids never collide across a
// compilation session, even when several contexts are alive.
static GLOBAL_ID: AtomicUsize = AtomicUsize::new(0usize);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Identifier(usize);

pub fn new_id() -> Identifier {
    Identifier(GLOBAL_ID.fetch_add(1, Ordering::Relaxed))
}
