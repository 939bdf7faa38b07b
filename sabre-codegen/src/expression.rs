use crate::compiler_utils::{self, add_constant_offset, append_abort_unless};
use crate::context::CompilerContext;
use crate::conversion::{cleanup_high_bits, convert};
use crate::error::{CodegenError, Result};
use crate::instruction::Instruction;
use crate::lvalue::LValue;

use log::debug;
use sabre_frontend::ast::*;
use sabre_frontend::semantic::SemanticContext;
use sabre_frontend::span::{SpanId, SpanLoc, SpannedBox};
use sabre_frontend::symbol::SymbolKind;
use sabre_frontend::typesystem::{DataLocation, FunctionKind, MagicKind, TypeId, TypeKind, TypeSystem};
use std::collections::{HashMap, HashSet};

lazy_static! {
    static ref MAGIC_MEMBER_INSTRUCTIONS: HashMap<(MagicKind, &'static str), Instruction> = {
        let mut m = HashMap::new();
        m.insert((MagicKind::Message, "sender"), Instruction::Caller);
        m.insert((MagicKind::Message, "value"), Instruction::Callvalue);
        m.insert((MagicKind::Message, "gas"), Instruction::Gas);
        m.insert((MagicKind::Transaction, "origin"), Instruction::Origin);
        m.insert((MagicKind::Transaction, "gasprice"), Instruction::Gasprice);
        m.insert((MagicKind::Block, "coinbase"), Instruction::Coinbase);
        m.insert((MagicKind::Block, "timestamp"), Instruction::Timestamp);
        m.insert((MagicKind::Block, "number"), Instruction::Number);
        m.insert((MagicKind::Block, "difficulty"), Instruction::Difficulty);
        m.insert((MagicKind::Block, "gaslimit"), Instruction::Gaslimit);
        m
    };
}

/// Compiles one expression tree into the context.
///
/// After compiling a node the stack has grown by exactly the stack size of
/// the node's type. The exception are nodes marked as assignment targets:
/// they leave a location in `current_lvalue` and only its reference word, if
/// any, on the stack.
pub struct ExpressionCompiler<'a> {
    pub(crate) ctx: &'a mut CompilerContext,
    pub(crate) semantic_context: &'a SemanticContext,
    pub(crate) current_lvalue: LValue,
    lvalue_requested: HashSet<SpanId>,
    depth: usize,
}

impl<'a> ExpressionCompiler<'a> {
    pub fn new(ctx: &'a mut CompilerContext, semantic_context: &'a SemanticContext) -> Self {
        Self {
            ctx,
            semantic_context,
            current_lvalue: LValue::None,
            lvalue_requested: HashSet::new(),
            depth: 0,
        }
    }

    pub(crate) fn ts(&self) -> &'a TypeSystem {
        &self.semantic_context.type_system
    }

    pub(crate) fn get_type(&self, expr: &SpannedBox<Expr>) -> TypeId {
        match self.semantic_context.get_ast_type(expr.id()) {
            Some(ty) => ty,
            None => panic!("Expression at {} has not been typed", expr.loc()),
        }
    }

    pub fn compile(&mut self, expr: &SpannedBox<Expr>) -> Result<()> {
        let limit = self.ctx.options().max_expression_depth;
        if self.depth >= limit {
            return Err(CodegenError::ExpressionTooDeep {
                loc: *expr.loc(),
                limit,
            });
        }

        let height_before = self.ctx.stack_height();
        self.depth += 1;
        let result = self.compile_expr(expr);
        self.depth -= 1;
        result?;

        let expected = if self.lvalue_requested.contains(&expr.id()) {
            self.current_lvalue.reference_size()
        } else {
            self.ts().stack_size(self.get_type(expr))
        };
        assert_eq!(
            self.ctx.stack_height(),
            height_before + expected,
            "Unexpected stack height after compiling the expression at {}",
            expr.loc()
        );
        Ok(())
    }

    fn compile_expr(&mut self, expr: &SpannedBox<Expr>) -> Result<()> {
        match expr.get() {
            Expr::Literal(e) => {
                self.ctx.push(e.0.get().word());
                Ok(())
            }
            Expr::Identifier(e) => self.compile_identifier(expr, e),
            Expr::Assignment(e) => self.compile_assignment(expr, e),
            Expr::UnOp(e) => self.compile_unary_operation(expr, e),
            Expr::BinOp(e) => self.compile_binary_operation(expr, e),
            Expr::Conditional(e) => self.compile_conditional(expr, e),
            Expr::IndexAccess(e) => self.compile_index_access(expr, e),
            Expr::MemberAccess(e) => self.compile_member_access(expr, e),
            Expr::FunctionCall(e) => self.compile_function_call(expr, e),
            Expr::New(e) => {
                let ts = self.ts();
                let ty = self.get_type(expr);
                // As the callee of a creation the call does all the work.
                if !ts.is_function_type(ty) {
                    compiler_utils::allocate_zeroed(self.ctx, ts, *e.0.get());
                }
                Ok(())
            }
            Expr::TypeName(..) => Ok(()),
        }
    }

    fn request_lvalue(&mut self, expr: &SpannedBox<Expr>) {
        self.lvalue_requested.insert(expr.id());
    }

    /// Compiles `expr` as a location and hands it over.
    fn compile_lvalue(&mut self, expr: &SpannedBox<Expr>) -> Result<LValue> {
        self.request_lvalue(expr);
        self.compile(expr)?;
        let lvalue = std::mem::take(&mut self.current_lvalue);
        assert!(
            lvalue.is_valid(),
            "Expression at {} is not assignable",
            expr.loc()
        );
        Ok(lvalue)
    }

    fn retrieve_lvalue_if_not_requested(&mut self, expr: &SpannedBox<Expr>) -> Result<()> {
        let requested = self.lvalue_requested.contains(&expr.id());
        let ts = self.ts();
        self.current_lvalue
            .retrieve_if_not_requested(self.ctx, ts, *expr.loc(), requested)
    }

    fn compile_identifier(&mut self, expr: &SpannedBox<Expr>, e: &ExprIdentifier) -> Result<()> {
        let ts = self.ts();
        let sc = self.semantic_context;
        let sym_id = match sc.get_ast_symbol(expr.id()) {
            Some(sym_id) => sym_id,
            None => panic!("Identifier {} has not been resolved", e.0.get()),
        };
        let sym = sc.get_symbol(sym_id);
        let ty = self.get_type(expr);
        match sym.get_kind() {
            SymbolKind::LocalVariable => {
                self.current_lvalue = LValue::from_local(self.ctx, ts, sym.get_name(), ty);
                self.retrieve_lvalue_if_not_requested(expr)?;
            }
            SymbolKind::StateVariable => {
                self.current_lvalue = LValue::from_state_variable(self.ctx, sym.get_name(), ty);
                self.retrieve_lvalue_if_not_requested(expr)?;
            }
            SymbolKind::Function => {
                let label = self.ctx.function_entry_label(sym.get_name());
                self.ctx.push_tag(label);
            }
            SymbolKind::This => {
                self.ctx.emit(Instruction::Address);
            }
            SymbolKind::Magic | SymbolKind::Contract | SymbolKind::Event => {}
            SymbolKind::None => panic!("Identifier {} has no kind", sym.get_name()),
        }
        Ok(())
    }

    fn compile_assignment(&mut self, expr: &SpannedBox<Expr>, e: &ExprAssignment) -> Result<()> {
        let ExprAssignment(op, lhs, rhs) = e;
        let ts = self.ts();
        let ty = self.get_type(expr);
        let rhs_ty = self.get_type(rhs);
        let loc = *expr.loc();

        self.compile(rhs)?;
        match op.get() {
            // The shift amount keeps its own type.
            AssignOp::Compound(bin_op) if bin_op.is_shift() => {
                cleanup_high_bits(self.ctx, ts, rhs_ty)
            }
            _ => convert(self.ctx, ts, rhs_ty, ty, false),
        }

        let lvalue = self.compile_lvalue(lhs)?;
        if let AssignOp::Compound(bin_op) = op.get() {
            // Bring the current value above the right hand side.
            if lvalue.stores_reference_on_stack() {
                self.ctx.emit(Instruction::swap(1));
                self.ctx.emit(Instruction::dup(2));
            }
            lvalue.retrieve(self.ctx, ts, loc, true)?;
            self.append_ordinary_binary_operator_code(*bin_op, ty);
            if lvalue.stores_reference_on_stack() {
                self.ctx.emit(Instruction::swap(1));
            }
        }
        lvalue.store(self.ctx, ts, loc, false)
    }

    fn compile_unary_operation(&mut self, expr: &SpannedBox<Expr>, e: &ExprUnOp) -> Result<()> {
        let ExprUnOp(op, operand) = e;
        let ts = self.ts();
        let ty = self.get_type(expr);
        let loc = *expr.loc();
        match op.get() {
            UnaryOp::LogicalNot => {
                self.compile(operand)?;
                self.ctx.emit(Instruction::Iszero);
            }
            UnaryOp::BitNot => {
                self.compile(operand)?;
                self.ctx.emit(Instruction::Not);
                cleanup_high_bits(self.ctx, ts, ty);
            }
            UnaryOp::Negation => {
                self.compile(operand)?;
                self.ctx.push_u64(0);
                self.ctx.emit(Instruction::Sub);
                cleanup_high_bits(self.ctx, ts, ty);
            }
            UnaryOp::Plus => {
                self.compile(operand)?;
            }
            UnaryOp::Delete => {
                let lvalue = self.compile_lvalue(operand)?;
                lvalue.set_to_zero(self.ctx, ts, loc)?;
            }
            UnaryOp::Increment { prefix } | UnaryOp::Decrement { prefix } => {
                let prefix = *prefix;
                let lvalue = self.compile_lvalue(operand)?;
                lvalue.retrieve(self.ctx, ts, loc, false)?;
                if !prefix {
                    // Keep the old value below the reference as the result.
                    if lvalue.stores_reference_on_stack() {
                        self.ctx.emit(Instruction::swap(1));
                        self.ctx.emit(Instruction::dup(2));
                    } else {
                        self.ctx.emit(Instruction::dup(1));
                    }
                }
                self.ctx.push_u64(1);
                if matches!(op.get(), UnaryOp::Increment { .. }) {
                    self.ctx.emit(Instruction::Add);
                } else {
                    self.ctx.emit(Instruction::swap(1));
                    self.ctx.emit(Instruction::Sub);
                }
                cleanup_high_bits(self.ctx, ts, ty);
                if lvalue.stores_reference_on_stack() {
                    self.ctx.emit(Instruction::swap(1));
                }
                lvalue.store(self.ctx, ts, loc, !prefix)?;
            }
        }
        Ok(())
    }

    fn compile_binary_operation(&mut self, expr: &SpannedBox<Expr>, e: &ExprBinOp) -> Result<()> {
        let ExprBinOp(op, lhs, rhs) = e;
        let op = *op.get();
        if op.is_logical() {
            return self.append_and_or_operator_code(op, lhs, rhs);
        }

        let ts = self.ts();
        let common = match self.semantic_context.get_ast_common_type(expr.id()) {
            Some(ty) => ty,
            None => panic!("Binary operation at {} has no operand type", expr.loc()),
        };
        let cleanup_needed = op.is_relational()
            || matches!(op, BinOperand::Division | BinOperand::Modulo);
        let lhs_ty = self.get_type(lhs);
        let rhs_ty = self.get_type(rhs);
        // The shift amount keeps its own type.
        let rhs_target = if op.is_shift() { rhs_ty } else { common };

        // The left operand ends up on top, except that a literal right
        // operand of a commutative operator is pushed last.
        let swap = op.is_commutative() && rhs.get().is_literal() && !lhs.get().is_literal();
        if swap {
            self.compile(lhs)?;
            convert(self.ctx, ts, lhs_ty, common, cleanup_needed);
            self.compile(rhs)?;
            convert(self.ctx, ts, rhs_ty, rhs_target, cleanup_needed);
        } else {
            self.compile(rhs)?;
            convert(self.ctx, ts, rhs_ty, rhs_target, cleanup_needed);
            self.compile(lhs)?;
            convert(self.ctx, ts, lhs_ty, common, cleanup_needed);
        }

        self.append_ordinary_binary_operator_code(op, common);
        Ok(())
    }

    fn append_and_or_operator_code(
        &mut self,
        op: BinOperand,
        lhs: &SpannedBox<Expr>,
        rhs: &SpannedBox<Expr>,
    ) -> Result<()> {
        self.compile(lhs)?;
        self.ctx.emit(Instruction::dup(1));
        if op == BinOperand::LogicalAnd {
            self.ctx.emit(Instruction::Iszero);
        }
        let end = self.ctx.append_conditional_jump();
        let height_at_jump = self.ctx.stack_height();
        self.ctx.emit(Instruction::Pop);
        self.compile(rhs)?;
        assert_eq!(
            self.ctx.stack_height(),
            height_at_jump,
            "Both sides of {} must leave the same stack height",
            op
        );
        self.ctx.bind_label(end);
        Ok(())
    }

    /// Expects the right operand below the left one and leaves the result.
    pub(crate) fn append_ordinary_binary_operator_code(&mut self, op: BinOperand, ty: TypeId) {
        let ts = self.ts();
        if op.is_relational() {
            self.append_compare_operator_code(op, ty);
            return;
        }
        let signed = ts.is_signed(ty);
        match op {
            BinOperand::Addition => self.ctx.emit(Instruction::Add),
            BinOperand::Subtraction => self.ctx.emit(Instruction::Sub),
            BinOperand::Multiplication => self.ctx.emit(Instruction::Mul),
            BinOperand::Division => self.ctx.emit(if signed {
                Instruction::Sdiv
            } else {
                Instruction::Div
            }),
            BinOperand::Modulo => self.ctx.emit(if signed {
                Instruction::Smod
            } else {
                Instruction::Mod
            }),
            BinOperand::Exponentiation => self.ctx.emit(Instruction::Exp),
            BinOperand::BitAnd => self.ctx.emit(Instruction::And),
            BinOperand::BitOr => self.ctx.emit(Instruction::Or),
            BinOperand::BitXor => self.ctx.emit(Instruction::Xor),
            BinOperand::ShiftLeft | BinOperand::ShiftRight => {
                // Shift instructions take the amount from the top.
                self.ctx.emit(Instruction::swap(1));
                self.ctx.emit(match op {
                    BinOperand::ShiftLeft => Instruction::Shl,
                    _ if signed => Instruction::Sar,
                    _ => Instruction::Shr,
                });
            }
            _ => panic!("Unexpected binary operator {}", op),
        }
        cleanup_high_bits(self.ctx, ts, ty);
    }

    fn append_compare_operator_code(&mut self, op: BinOperand, ty: TypeId) {
        let signed = self.ts().is_signed(ty);
        let (less, greater) = if signed {
            (Instruction::Slt, Instruction::Sgt)
        } else {
            (Instruction::Lt, Instruction::Gt)
        };
        match op {
            BinOperand::Equal => self.ctx.emit(Instruction::Eq),
            BinOperand::Different => {
                self.ctx.emit(Instruction::Eq);
                self.ctx.emit(Instruction::Iszero);
            }
            BinOperand::LowerThan => self.ctx.emit(less),
            BinOperand::GreaterThan => self.ctx.emit(greater),
            BinOperand::LowerOrEqualThan => {
                self.ctx.emit(greater);
                self.ctx.emit(Instruction::Iszero);
            }
            BinOperand::GreaterOrEqualThan => {
                self.ctx.emit(less);
                self.ctx.emit(Instruction::Iszero);
            }
            _ => panic!("Unexpected comparison operator {}", op),
        }
    }

    fn compile_conditional(&mut self, expr: &SpannedBox<Expr>, e: &ExprConditional) -> Result<()> {
        let ExprConditional(condition, then_expr, else_expr) = e;
        let ts = self.ts();
        let ty = self.get_type(expr);
        let then_ty = self.get_type(then_expr);
        let else_ty = self.get_type(else_expr);

        self.compile(condition)?;
        self.ctx.emit(Instruction::Iszero);
        let else_label = self.ctx.append_conditional_jump();
        let height_at_branch = self.ctx.stack_height();

        self.compile(then_expr)?;
        convert(self.ctx, ts, then_ty, ty, false);
        let end = self.ctx.new_label();
        self.ctx.append_jump_to(end);
        let height_after_then = self.ctx.stack_height();

        self.ctx.set_stack_height(height_at_branch);
        self.ctx.bind_label(else_label);
        self.compile(else_expr)?;
        convert(self.ctx, ts, else_ty, ty, false);
        assert_eq!(
            self.ctx.stack_height(),
            height_after_then,
            "Branches of the conditional at {} leave different stack heights",
            expr.loc()
        );
        self.ctx.bind_label(end);
        Ok(())
    }

    fn compile_index_access(&mut self, expr: &SpannedBox<Expr>, e: &ExprIndexAccess) -> Result<()> {
        let ExprIndexAccess(base, index) = e;
        let ts = self.ts();
        let base_ty = self.get_type(base);
        let index_ty = self.get_type(index);

        self.compile(base)?;
        self.compile(index)?;
        match ts.get_kind(base_ty) {
            TypeKind::Mapping { key, value } => {
                convert(self.ctx, ts, index_ty, *key, true);
                compiler_utils::compute_mapping_slot(self.ctx);
                self.current_lvalue = LValue::StorageReference {
                    ty: *value,
                    byte_offset: 0,
                };
            }
            TypeKind::Array {
                element,
                length,
                location,
            } => {
                assert_static_storage_array(ts, base_ty);
                cleanup_high_bits(self.ctx, ts, index_ty);
                self.append_bounds_check(*length);
                match location {
                    DataLocation::Storage => {
                        let element_slots = ts.storage_slots(*element);
                        if element_slots != 1 {
                            self.ctx.push_u64(element_slots);
                            self.ctx.emit(Instruction::Mul);
                        }
                        self.ctx.emit(Instruction::Add);
                        self.current_lvalue = LValue::StorageReference {
                            ty: *element,
                            byte_offset: 0,
                        };
                    }
                    DataLocation::Memory => {
                        self.ctx.push_u64(32);
                        self.ctx.emit(Instruction::Mul);
                        self.ctx.emit(Instruction::Add);
                        if length.is_none() {
                            // Skip the length word.
                            add_constant_offset(self.ctx, 32);
                        }
                        self.current_lvalue = LValue::MemoryReference { ty: *element };
                    }
                }
            }
            _ => panic!("Type {} cannot be indexed", ts.type_name(base_ty)),
        }
        self.retrieve_lvalue_if_not_requested(expr)
    }

    /// `[base index] -> [base index]`, aborting unless `index < length`. A
    /// missing length is read from the memory array itself.
    fn append_bounds_check(&mut self, length: Option<u64>) {
        self.ctx.emit(Instruction::dup(1));
        match length {
            Some(length) => self.ctx.push_u64(length),
            None => {
                self.ctx.emit(Instruction::dup(3));
                self.ctx.emit(Instruction::Mload);
            }
        }
        self.ctx.emit(Instruction::Gt);
        append_abort_unless(self.ctx);
    }

    fn compile_member_access(&mut self, expr: &SpannedBox<Expr>, e: &ExprMemberAccess) -> Result<()> {
        let ExprMemberAccess(base, member) = e;
        let member = member.get().as_str();
        let ts = self.ts();
        let base_ty = self.get_type(base);
        let ty = self.get_type(expr);

        self.compile(base)?;
        match ts.get_kind(base_ty) {
            TypeKind::Magic(kind) => match MAGIC_MEMBER_INSTRUCTIONS.get(&(*kind, member)) {
                Some(ins) => self.ctx.emit(*ins),
                None => panic!("Unknown member {} of {}", member, ts.type_name(base_ty)),
            },
            TypeKind::Struct {
                location: DataLocation::Storage,
                ..
            } => {
                let offset = ts.struct_member_storage_offset(base_ty, member);
                add_constant_offset(self.ctx, offset.slot);
                self.current_lvalue = LValue::StorageReference {
                    ty,
                    byte_offset: offset.byte_offset,
                };
                self.retrieve_lvalue_if_not_requested(expr)?;
            }
            TypeKind::Struct {
                location: DataLocation::Memory,
                ..
            } => {
                add_constant_offset(self.ctx, ts.struct_member_memory_offset(base_ty, member));
                self.current_lvalue = LValue::MemoryReference { ty };
                self.retrieve_lvalue_if_not_requested(expr)?;
            }
            TypeKind::Array { length, .. } if member == "length" => {
                assert_static_storage_array(ts, base_ty);
                match length {
                    Some(length) => {
                        self.ctx.emit(Instruction::Pop);
                        self.ctx.push_u64(*length);
                    }
                    None => self.ctx.emit(Instruction::Mload),
                }
            }
            TypeKind::Address | TypeKind::Contract(..) => {
                convert(self.ctx, ts, base_ty, ts.get_address_type(), true);
                if member == "balance" {
                    self.ctx.emit(Instruction::Balance);
                } else {
                    match &ts.function_type(ty).kind {
                        FunctionKind::Bare | FunctionKind::Send => {}
                        FunctionKind::External { selector } => {
                            self.ctx.push_u64(*selector as u64);
                        }
                        _ => panic!(
                            "Unexpected member {} of {}",
                            member,
                            ts.type_name(base_ty)
                        ),
                    }
                }
            }
            _ => panic!(
                "Invalid member access to {} of {}",
                member,
                ts.type_name(base_ty)
            ),
        }
        Ok(())
    }
}

/// Only memory arrays carry their length with them.
fn assert_static_storage_array(ts: &TypeSystem, ty: TypeId) {
    if let TypeKind::Array {
        length: None,
        location: DataLocation::Storage,
        ..
    } = ts.get_kind(ty)
    {
        panic!("Storage array {} has no static length", ts.type_name(ty));
    }
}

/// Entry point for one expression tree. On failure the context is left as it
/// was before the call.
pub fn compile_expression(
    ctx: &mut CompilerContext,
    semantic_context: &SemanticContext,
    expr: &SpannedBox<Expr>,
) -> Result<()> {
    debug!("Compiling expression at {}", expr.loc());
    let checkpoint = ctx.checkpoint();
    let result = {
        let mut compiler = ExpressionCompiler::new(ctx, semantic_context);
        compiler.compile(expr)
    };
    let result = result.and_then(|_| check_code_size(ctx, *expr.loc()));
    match result {
        Ok(()) => {
            debug!("Expression at {} now ends at {} items", expr.loc(), ctx.code_size());
            Ok(())
        }
        Err(e) => {
            debug!("Discarding code of expression at {}: {}", expr.loc(), e);
            ctx.rollback(checkpoint);
            Err(e)
        }
    }
}

pub(crate) fn check_code_size(ctx: &CompilerContext, loc: SpanLoc) -> Result<()> {
    let limit = ctx.options().max_code_size;
    if ctx.code_size() > limit {
        return Err(CodegenError::CodeTooLarge {
            loc,
            size: ctx.code_size(),
            limit,
        });
    }
    Ok(())
}
