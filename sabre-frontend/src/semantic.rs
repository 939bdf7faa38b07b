use crate::span;
use crate::symbol::{Symbol, SymbolId};
use crate::typesystem::{TypeId, TypeSystem};

use std::collections::HashMap;

/// Results of name and type resolution, keyed by tree node. The code
/// generator only reads from it.
pub struct SemanticContext {
    pub type_system: TypeSystem,

    symbols: HashMap<SymbolId, Symbol>,
    ast_types: HashMap<span::SpanId, TypeId>,
    ast_symbols: HashMap<span::SpanId, SymbolId>,
    // Operand type of binary operators, both sides are converted to it.
    ast_common_types: HashMap<span::SpanId, TypeId>,
}

impl SemanticContext {
    pub fn new() -> SemanticContext {
        SemanticContext {
            type_system: TypeSystem::new(),
            symbols: HashMap::new(),
            ast_types: HashMap::new(),
            ast_symbols: HashMap::new(),
            ast_common_types: HashMap::new(),
        }
    }

    pub fn get_ast_type(&self, id: span::SpanId) -> Option<TypeId> {
        self.ast_types.get(&id).cloned()
    }

    pub fn set_ast_type(&mut self, id: span::SpanId, ty: TypeId) {
        self.ast_types.insert(id, ty);
    }

    pub fn get_ast_common_type(&self, id: span::SpanId) -> Option<TypeId> {
        self.ast_common_types.get(&id).cloned()
    }

    pub fn set_ast_common_type(&mut self, id: span::SpanId, ty: TypeId) {
        self.ast_common_types.insert(id, ty);
    }

    pub fn new_symbol(&mut self, sym: Symbol) -> SymbolId {
        let id = sym.id();
        self.symbols.insert(id, sym);
        id
    }

    pub fn get_symbol(&self, id: SymbolId) -> &Symbol {
        match self.symbols.get(&id) {
            Some(sym) => sym,
            None => panic!("Unknown symbol {:?}", id),
        }
    }

    pub fn get_symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        match self.symbols.get_mut(&id) {
            Some(sym) => sym,
            None => panic!("Unknown symbol {:?}", id),
        }
    }

    pub fn set_ast_symbol(&mut self, id: span::SpanId, sym: SymbolId) {
        self.ast_symbols.insert(id, sym);
    }

    pub fn get_ast_symbol(&self, id: span::SpanId) -> Option<SymbolId> {
        self.ast_symbols.get(&id).cloned()
    }
}

impl Default for SemanticContext {
    fn default() -> Self {
        Self::new()
    }
}
