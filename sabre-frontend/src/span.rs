use crate::utils;
use std::fmt;

// Source locations attached to every node of the typed tree. The semantic
// side tables are keyed by SpanId, never by address.

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct SpanLoc(pub usize, pub usize);

impl SpanLoc {
    pub fn new(start: usize, end: usize) -> SpanLoc {
        SpanLoc(start, end)
    }
    pub fn begin(&self) -> usize {
        self.0
    }
    pub fn end(&self) -> usize {
        self.1
    }
}

impl fmt::Display for SpanLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.0, self.1)
    }
}

#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub struct SpanId(utils::Identifier);

#[derive(Debug)]
pub struct Spanned<T> {
    span_id: SpanId,
    loc: SpanLoc,
    child: T,
}

impl<T> Spanned<T> {
    pub fn new(loc: SpanLoc, child: T) -> Spanned<T> {
        Self {
            span_id: SpanId(utils::new_id()),
            loc,
            child,
        }
    }
    pub fn get(&self) -> &T {
        &self.child
    }
    pub fn loc(&self) -> &SpanLoc {
        &self.loc
    }
    pub fn id(&self) -> SpanId {
        self.span_id
    }
}

/// An owned, heap allocated tree node. The typed tree is immutable once built
/// so there is no way to detach a child.
#[derive(Debug)]
pub struct SpannedBox<T> {
    child: Box<Spanned<T>>,
}

impl<T> SpannedBox<T> {
    pub fn new(loc: SpanLoc, child: T) -> SpannedBox<T> {
        Self {
            child: Box::new(Spanned::new(loc, child)),
        }
    }
    pub fn get(&self) -> &T {
        self.child.get()
    }
    pub fn loc(&self) -> &SpanLoc {
        self.child.loc()
    }
    pub fn id(&self) -> SpanId {
        self.child.id()
    }
}
