//! Programmatic construction of typed expression trees.
//!
//! The builder records the type (and, for names, the symbol) of every node it
//! creates in the `SemanticContext`, deriving it from the operands where the
//! language rules determine it. Every node gets its own source location so
//! that diagnostics can point at it.

use crate::ast::*;
use crate::constant::Constant;
use crate::semantic::SemanticContext;
use crate::span::{SpanLoc, Spanned, SpannedBox};
use crate::symbol::{Symbol, SymbolId, SymbolKind};
use crate::typesystem::{TypeId, TypeKind};

pub struct TypedAstBuilder<'a> {
    ctx: &'a mut SemanticContext,
    next_offset: usize,
}

impl<'a> TypedAstBuilder<'a> {
    pub fn new(ctx: &'a mut SemanticContext) -> Self {
        Self {
            ctx,
            next_offset: 0,
        }
    }

    pub fn context(&mut self) -> &mut SemanticContext {
        self.ctx
    }

    fn next_loc(&mut self) -> SpanLoc {
        let begin = self.next_offset;
        self.next_offset += 1;
        SpanLoc::new(begin, begin + 1)
    }

    fn typed(&mut self, expr: Expr, ty: TypeId) -> SpannedBox<Expr> {
        let loc = self.next_loc();
        let node = SpannedBox::new(loc, expr);
        self.ctx.set_ast_type(node.id(), ty);
        node
    }

    fn type_of(&self, expr: &SpannedBox<Expr>) -> TypeId {
        match self.ctx.get_ast_type(expr.id()) {
            Some(ty) => ty,
            None => panic!("Expression at {} has no type", expr.loc()),
        }
    }

    pub fn declare(&mut self, name: &str, kind: SymbolKind, ty: TypeId) -> SymbolId {
        let mut sym = Symbol::new(name, kind, ty);
        let loc = self.next_loc();
        sym.set_defining_point(loc);
        self.ctx.new_symbol(sym)
    }

    pub fn literal<C: Into<Constant>>(&mut self, value: C, ty: TypeId) -> SpannedBox<Expr> {
        let loc = self.next_loc();
        self.typed(Expr::Literal(ExprLiteral(Spanned::new(loc, value.into()))), ty)
    }

    pub fn identifier(&mut self, sym: SymbolId) -> SpannedBox<Expr> {
        let (name, ty) = {
            let symbol = self.ctx.get_symbol(sym);
            match symbol.get_type() {
                Some(ty) => (symbol.get_name().clone(), ty),
                None => panic!("Symbol {} has no type", symbol.get_name()),
            }
        };
        let loc = self.next_loc();
        let node = self.typed(Expr::Identifier(ExprIdentifier(Spanned::new(loc, name))), ty);
        self.ctx.set_ast_symbol(node.id(), sym);
        node
    }

    pub fn assignment(
        &mut self,
        op: AssignOp,
        lhs: SpannedBox<Expr>,
        rhs: SpannedBox<Expr>,
    ) -> SpannedBox<Expr> {
        let ty = self.type_of(&lhs);
        let loc = self.next_loc();
        self.typed(
            Expr::Assignment(ExprAssignment(Spanned::new(loc, op), lhs, rhs)),
            ty,
        )
    }

    pub fn unary(&mut self, op: UnaryOp, operand: SpannedBox<Expr>) -> SpannedBox<Expr> {
        let ty = match op {
            UnaryOp::LogicalNot => self.ctx.type_system.get_bool_type(),
            UnaryOp::Delete => self.ctx.type_system.get_void_type(),
            _ => self.type_of(&operand),
        };
        let loc = self.next_loc();
        self.typed(Expr::UnOp(ExprUnOp(Spanned::new(loc, op), operand)), ty)
    }

    /// `common` is the type both operands are converted to.
    pub fn binary(
        &mut self,
        op: BinOperand,
        lhs: SpannedBox<Expr>,
        rhs: SpannedBox<Expr>,
        common: TypeId,
    ) -> SpannedBox<Expr> {
        let ty = if op.is_relational() || op.is_logical() {
            self.ctx.type_system.get_bool_type()
        } else {
            common
        };
        let loc = self.next_loc();
        let node = self.typed(
            Expr::BinOp(ExprBinOp(Spanned::new(loc, op), lhs, rhs)),
            ty,
        );
        self.ctx.set_ast_common_type(node.id(), common);
        node
    }

    pub fn conditional(
        &mut self,
        condition: SpannedBox<Expr>,
        then_expr: SpannedBox<Expr>,
        else_expr: SpannedBox<Expr>,
        ty: TypeId,
    ) -> SpannedBox<Expr> {
        self.typed(
            Expr::Conditional(ExprConditional(condition, then_expr, else_expr)),
            ty,
        )
    }

    pub fn index(&mut self, base: SpannedBox<Expr>, index: SpannedBox<Expr>) -> SpannedBox<Expr> {
        let base_ty = self.type_of(&base);
        let ty = match self.ctx.type_system.get_kind(base_ty) {
            TypeKind::Mapping { value, .. } => *value,
            TypeKind::Array { element, .. } => *element,
            _ => panic!(
                "Type {} cannot be indexed",
                self.ctx.type_system.type_name(base_ty)
            ),
        };
        self.typed(Expr::IndexAccess(ExprIndexAccess(base, index)), ty)
    }

    /// Member access whose type follows from the base: struct members,
    /// `length` of arrays, `balance` of addresses and the members of `msg`,
    /// `block` and `tx`.
    pub fn member(&mut self, base: SpannedBox<Expr>, member: &str) -> SpannedBox<Expr> {
        let base_ty = self.type_of(&base);
        let ts = &mut self.ctx.type_system;
        let ty = match ts.get_kind(base_ty).clone() {
            TypeKind::Struct { .. } => ts.struct_member_type(base_ty, member),
            TypeKind::Array { .. } if member == "length" => ts.get_uint256_type(),
            TypeKind::Address | TypeKind::Contract(..) if member == "balance" => {
                ts.get_uint256_type()
            }
            TypeKind::Magic(kind) => match ts.get_magic_member_type(kind, member) {
                Some(ty) => ty,
                None => panic!("Unknown member {} of {}", member, ts.type_name(base_ty)),
            },
            _ => panic!(
                "Cannot derive the type of member {} of {}",
                member,
                ts.type_name(base_ty)
            ),
        };
        self.member_with_type(base, member, ty)
    }

    /// Member access whose type is decided by the caller, e.g. external
    /// functions of a contract or `send` of an address.
    pub fn member_with_type(
        &mut self,
        base: SpannedBox<Expr>,
        member: &str,
        ty: TypeId,
    ) -> SpannedBox<Expr> {
        let loc = self.next_loc();
        self.typed(
            Expr::MemberAccess(ExprMemberAccess(
                base,
                Spanned::new(loc, member.to_string()),
            )),
            ty,
        )
    }

    pub fn call(&mut self, callee: SpannedBox<Expr>, args: Vec<SpannedBox<Expr>>) -> SpannedBox<Expr> {
        self.call_with_options(callee, args, CallOptions::default())
    }

    pub fn call_with_options(
        &mut self,
        callee: SpannedBox<Expr>,
        args: Vec<SpannedBox<Expr>>,
        options: CallOptions,
    ) -> SpannedBox<Expr> {
        let callee_ty = self.type_of(&callee);
        let ts = &self.ctx.type_system;
        let ty = match ts.get_kind(callee_ty) {
            TypeKind::TypeType(target) => *target,
            TypeKind::Function(f) => match f.returns.first() {
                Some(ty) => *ty,
                None => ts.get_void_type(),
            },
            _ => panic!("Type {} is not callable", ts.type_name(callee_ty)),
        };
        self.typed(
            Expr::FunctionCall(ExprFunctionCall(callee, args, options)),
            ty,
        )
    }

    /// `new T` for a statically sized memory struct or array.
    pub fn new_object(&mut self, created: TypeId) -> SpannedBox<Expr> {
        let loc = self.next_loc();
        self.typed(Expr::New(ExprNew(Spanned::new(loc, created))), created)
    }

    /// `new C` or `new T[]` used as the callee of a creation call.
    pub fn new_callee(&mut self, created: TypeId, function_ty: TypeId) -> SpannedBox<Expr> {
        let loc = self.next_loc();
        self.typed(Expr::New(ExprNew(Spanned::new(loc, created))), function_ty)
    }

    pub fn type_name(&mut self, target: TypeId) -> SpannedBox<Expr> {
        let ty = self.ctx.type_system.get_type_type(target);
        let loc = self.next_loc();
        self.typed(Expr::TypeName(ExprTypeName(Spanned::new(loc, target))), ty)
    }
}
