use crate::span;
use crate::typesystem::TypeId;
use crate::utils;

#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, Ord, PartialOrd)]
pub struct SymbolId(utils::Identifier);

impl Default for SymbolId {
    fn default() -> SymbolId {
        SymbolId(utils::new_id())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    #[default]
    None,
    /// Lives on the machine stack.
    LocalVariable,
    /// Lives in storage.
    StateVariable,
    Function,
    /// The executing contract itself.
    This,
    /// `msg`, `block` or `tx`.
    Magic,
    Contract,
    Event,
}

#[derive(Debug, Default)]
struct SymbolInfo {
    name: String,
    kind: SymbolKind,
    ty: Option<TypeId>,
    def_loc: Option<span::SpanLoc>,
    public: bool,
}

#[derive(Debug)]
pub struct Symbol {
    id: SymbolId,
    info: SymbolInfo,
}

impl Symbol {
    pub fn new(name: &str, kind: SymbolKind, ty: TypeId) -> Symbol {
        Symbol {
            id: SymbolId::default(),
            info: SymbolInfo {
                name: name.to_string(),
                kind,
                ty: Some(ty),
                ..Default::default()
            },
        }
    }

    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn get_name(&self) -> &String {
        &self.info.name
    }

    pub fn get_kind(&self) -> SymbolKind {
        self.info.kind
    }

    pub fn get_type(&self) -> Option<TypeId> {
        self.info.ty
    }

    pub fn get_defining_point(&self) -> Option<span::SpanLoc> {
        self.info.def_loc
    }

    pub fn set_defining_point(&mut self, span: span::SpanLoc) {
        self.info.def_loc = Some(span);
    }

    /// State variables marked public get a generated accessor.
    pub fn is_public(&self) -> bool {
        self.info.public
    }

    pub fn set_public(&mut self, public: bool) {
        self.info.public = public;
    }
}
