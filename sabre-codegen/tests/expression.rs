use pretty_assertions::assert_eq;
use sabre_codegen::error::CodegenError;
use sabre_codegen::instruction::Instruction;
use sabre_codegen::{compile_expression, CodegenOptions, CompilerContext};
use sabre_frontend::ast::{AssignOp, BinOperand, UnaryOp};
use sabre_frontend::builder::TypedAstBuilder;
use sabre_frontend::diagnostics::{Diagnostic, DiagnosticKind};
use sabre_frontend::semantic::SemanticContext;
use sabre_frontend::symbol::{SymbolId, SymbolKind};
use sabre_frontend::typesystem::{DataLocation, MagicKind, TypeId};

mod common;

use common::machine::{signed_word, word, Fault, Machine, CALLER_ADDRESS};
use common::{init_logging, int, items_from, op, push, push_local, uint};

#[test]
fn literal_is_a_single_push() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u8_ty = uint(&mut sc, 8);
    let mut b = TypedAstBuilder::new(&mut sc);
    let expr = b.literal(7u64, u8_ty);

    let mut ctx = CompilerContext::default();
    compile_expression(&mut ctx, &sc, &expr).unwrap();
    assert_eq!(ctx.items().to_vec(), vec![push(7)]);
    assert_eq!(ctx.stack_height(), 1);
}

#[test]
fn assignment_to_local() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let a = b.declare("a", SymbolKind::LocalVariable, u256);
    let lhs = b.identifier(a);
    let a_use = b.identifier(a);
    let one = b.literal(1u64, u256);
    let sum = b.binary(BinOperand::Addition, a_use, one, u256);
    let expr = b.assignment(AssignOp::Assign, lhs, sum);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "a", word(5));
    compile_expression(&mut ctx, &sc, &expr).unwrap();
    assert_eq!(
        items_from(&ctx, 1),
        vec![
            op(Instruction::dup(1)),
            push(1),
            op(Instruction::Add),
            op(Instruction::swap(1)),
            op(Instruction::Pop),
            op(Instruction::dup(1)),
        ]
    );

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.stack, vec![word(6), word(6)]);
}

#[test]
fn compound_assignment_to_local() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let a = b.declare("a", SymbolKind::LocalVariable, u256);
    let lhs = b.identifier(a);
    let three = b.literal(3u64, u256);
    let expr = b.assignment(AssignOp::Compound(BinOperand::Subtraction), lhs, three);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "a", word(10));
    compile_expression(&mut ctx, &sc, &expr).unwrap();

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.stack, vec![word(7), word(7)]);
}

#[test]
fn compound_shift_keeps_the_amount_wide() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u8_ty = uint(&mut sc, 8);
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let a = b.declare("a", SymbolKind::LocalVariable, u8_ty);
    let s = b.declare("s", SymbolKind::LocalVariable, u256);
    let lhs = b.identifier(a);
    let amount = b.identifier(s);
    let expr = b.assignment(AssignOp::Compound(BinOperand::ShiftLeft), lhs, amount);

    for (shift, expected) in [(256, 0), (3, 8)] {
        let mut ctx = CompilerContext::default();
        push_local(&mut ctx, "a", word(1));
        push_local(&mut ctx, "s", word(shift));
        compile_expression(&mut ctx, &sc, &expr).unwrap();

        let mut m = Machine::new(&ctx);
        m.run().unwrap();
        assert_eq!(m.stack, vec![word(expected), word(shift), word(expected)]);
    }
}

fn short_circuit(flag: u64) -> Vec<alloy_primitives::U256> {
    let mut sc = SemanticContext::new();
    let bool_ty = sc.type_system.get_bool_type();
    let mut b = TypedAstBuilder::new(&mut sc);
    let f = b.declare("f", SymbolKind::LocalVariable, bool_ty);
    let x = b.declare("x", SymbolKind::LocalVariable, bool_ty);
    let f_use = b.identifier(f);
    let x_use = b.identifier(x);
    let yes = b.literal(true, bool_ty);
    let set_x = b.assignment(AssignOp::Assign, x_use, yes);
    let expr = b.binary(BinOperand::LogicalAnd, f_use, set_x, bool_ty);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "f", word(flag));
    push_local(&mut ctx, "x", word(0));
    compile_expression(&mut ctx, &sc, &expr).unwrap();
    assert_eq!(ctx.stack_height(), 3);

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    m.stack
}

#[test]
fn logical_and_skips_right_operand() {
    init_logging();
    assert_eq!(short_circuit(0), vec![word(0), word(0), word(0)]);
    assert_eq!(short_circuit(1), vec![word(1), word(1), word(1)]);
}

#[test]
fn conditional_picks_a_branch() {
    init_logging();
    for (condition, expected) in [(1, 10), (0, 20)] {
        let mut sc = SemanticContext::new();
        let bool_ty = sc.type_system.get_bool_type();
        let u8_ty = uint(&mut sc, 8);
        let mut b = TypedAstBuilder::new(&mut sc);
        let c = b.declare("c", SymbolKind::LocalVariable, bool_ty);
        let c_use = b.identifier(c);
        let then_expr = b.literal(10u64, u8_ty);
        let else_expr = b.literal(20u64, u8_ty);
        let expr = b.conditional(c_use, then_expr, else_expr, u8_ty);

        let mut ctx = CompilerContext::default();
        push_local(&mut ctx, "c", word(condition));
        compile_expression(&mut ctx, &sc, &expr).unwrap();
        assert_eq!(ctx.stack_height(), 2);

        let mut m = Machine::new(&ctx);
        m.run().unwrap();
        assert_eq!(m.stack, vec![word(condition), word(expected)]);
    }
}

#[test]
fn signed_comparison() {
    init_logging();
    let mut sc = SemanticContext::new();
    let i8_ty = int(&mut sc, 8);
    let mut b = TypedAstBuilder::new(&mut sc);
    let x = b.declare("x", SymbolKind::LocalVariable, i8_ty);
    let y = b.declare("y", SymbolKind::LocalVariable, i8_ty);
    let x_use = b.identifier(x);
    let y_use = b.identifier(y);
    let expr = b.binary(BinOperand::LowerThan, x_use, y_use, i8_ty);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "x", signed_word(-1));
    push_local(&mut ctx, "y", word(1));
    compile_expression(&mut ctx, &sc, &expr).unwrap();
    assert!(common::contains_instruction(&ctx, Instruction::Slt));

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.top(), word(1));
}

#[test]
fn narrow_addition_wraps() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u8_ty = uint(&mut sc, 8);
    let mut b = TypedAstBuilder::new(&mut sc);
    let a = b.declare("a", SymbolKind::LocalVariable, u8_ty);
    let a_use = b.identifier(a);
    let hundred = b.literal(100u64, u8_ty);
    let expr = b.binary(BinOperand::Addition, a_use, hundred, u8_ty);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "a", word(200));
    compile_expression(&mut ctx, &sc, &expr).unwrap();

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.top(), word(44));
}

#[test]
fn signed_division_truncates() {
    init_logging();
    let mut sc = SemanticContext::new();
    let i8_ty = int(&mut sc, 8);
    let mut b = TypedAstBuilder::new(&mut sc);
    let a = b.declare("a", SymbolKind::LocalVariable, i8_ty);
    let a_use = b.identifier(a);
    let two = b.literal(2u64, i8_ty);
    let expr = b.binary(BinOperand::Division, a_use, two, i8_ty);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "a", signed_word(-7));
    compile_expression(&mut ctx, &sc, &expr).unwrap();

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.top(), signed_word(-3));
}

#[test]
fn shift_left_is_cleaned() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u8_ty = uint(&mut sc, 8);
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let a = b.declare("a", SymbolKind::LocalVariable, u8_ty);
    let a_use = b.identifier(a);
    let seven = b.literal(7u64, u256);
    let expr = b.binary(BinOperand::ShiftLeft, a_use, seven, u8_ty);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "a", word(3));
    compile_expression(&mut ctx, &sc, &expr).unwrap();
    assert_eq!(
        items_from(&ctx, 1)[..4].to_vec(),
        vec![
            push(7),
            op(Instruction::dup(2)),
            op(Instruction::swap(1)),
            op(Instruction::Shl),
        ]
    );

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.top(), word(0x80));
}

#[test]
fn postfix_increment_yields_old_value() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let i = b.declare("i", SymbolKind::LocalVariable, u256);
    let i_use = b.identifier(i);
    let expr = b.unary(UnaryOp::Increment { prefix: false }, i_use);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "i", word(5));
    compile_expression(&mut ctx, &sc, &expr).unwrap();

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.stack, vec![word(6), word(5)]);
}

#[test]
fn prefix_decrement_yields_new_value() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let i = b.declare("i", SymbolKind::LocalVariable, u256);
    let i_use = b.identifier(i);
    let expr = b.unary(UnaryOp::Decrement { prefix: true }, i_use);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "i", word(5));
    compile_expression(&mut ctx, &sc, &expr).unwrap();

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.stack, vec![word(4), word(4)]);
}

#[test]
fn negation_of_narrow_signed() {
    init_logging();
    let mut sc = SemanticContext::new();
    let i16_ty = int(&mut sc, 16);
    let mut b = TypedAstBuilder::new(&mut sc);
    let a = b.declare("a", SymbolKind::LocalVariable, i16_ty);
    let a_use = b.identifier(a);
    let expr = b.unary(UnaryOp::Negation, a_use);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "a", word(300));
    compile_expression(&mut ctx, &sc, &expr).unwrap();

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.top(), signed_word(-300));
}

#[test]
fn delete_local_zeroes_it() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let a = b.declare("a", SymbolKind::LocalVariable, u256);
    let a_use = b.identifier(a);
    let expr = b.unary(UnaryOp::Delete, a_use);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "a", word(9));
    compile_expression(&mut ctx, &sc, &expr).unwrap();
    assert_eq!(ctx.stack_height(), 1);

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.stack, vec![word(0)]);
}

#[test]
fn message_sender() {
    init_logging();
    let mut sc = SemanticContext::new();
    let msg_ty = sc.type_system.get_magic_type(MagicKind::Message);
    let mut b = TypedAstBuilder::new(&mut sc);
    let msg = b.declare("msg", SymbolKind::Magic, msg_ty);
    let msg_use = b.identifier(msg);
    let expr = b.member(msg_use, "sender");

    let mut ctx = CompilerContext::default();
    compile_expression(&mut ctx, &sc, &expr).unwrap();
    assert_eq!(ctx.items().to_vec(), vec![op(Instruction::Caller)]);

    let mut m = Machine::new(&ctx);
    m.run().unwrap();
    assert_eq!(m.top(), word(CALLER_ADDRESS));
}

#[test]
fn address_balance() {
    init_logging();
    let mut sc = SemanticContext::new();
    let address = sc.type_system.get_address_type();
    let mut b = TypedAstBuilder::new(&mut sc);
    let a = b.declare("a", SymbolKind::LocalVariable, address);
    let a_use = b.identifier(a);
    let expr = b.member(a_use, "balance");

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "a", word(0xbeef));
    compile_expression(&mut ctx, &sc, &expr).unwrap();
    assert!(common::contains_instruction(&ctx, Instruction::Balance));

    let mut m = Machine::new(&ctx);
    m.balances.insert(word(0xbeef), word(1000));
    m.run().unwrap();
    assert_eq!(m.stack, vec![word(0xbeef), word(1000)]);
}

#[test]
fn assembly_dump_indents_instructions() {
    init_logging();
    let mut sc = SemanticContext::new();
    let bool_ty = sc.type_system.get_bool_type();
    let u8_ty = uint(&mut sc, 8);
    let mut b = TypedAstBuilder::new(&mut sc);
    let c = b.declare("c", SymbolKind::LocalVariable, bool_ty);
    let c_use = b.identifier(c);
    let then_expr = b.literal(1u64, u8_ty);
    let else_expr = b.literal(2u64, u8_ty);
    let expr = b.conditional(c_use, then_expr, else_expr, u8_ty);

    let mut ctx = CompilerContext::default();
    push_local(&mut ctx, "c", word(1));
    compile_expression(&mut ctx, &sc, &expr).unwrap();

    let dump = ctx.to_string();
    assert_eq!(dump.lines().count(), ctx.items().len());
    assert!(dump
        .lines()
        .any(|line| line.starts_with("tag_") && line.ends_with(':')));
    assert!(dump.lines().any(|line| line == "    JUMPI"));
}

#[test]
fn nesting_limit_is_an_error() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let mut expr = b.literal(0u64, u256);
    for _ in 0..4 {
        let one = b.literal(1u64, u256);
        expr = b.binary(BinOperand::Addition, expr, one, u256);
    }

    let mut ctx = CompilerContext::new(CodegenOptions {
        max_expression_depth: 3,
        ..CodegenOptions::default()
    });
    ctx.push_u64(1);
    let result = compile_expression(&mut ctx, &sc, &expr);
    assert!(matches!(
        result,
        Err(CodegenError::ExpressionTooDeep { limit: 3, .. })
    ));
    // Nothing of the failed expression is left behind.
    assert_eq!(ctx.items().to_vec(), vec![push(1)]);
    assert_eq!(ctx.stack_height(), 1);

    let diagnostic = Diagnostic::from(result.unwrap_err());
    assert_eq!(diagnostic.kind, DiagnosticKind::Error);
    assert_eq!(diagnostic.message, "expression nesting exceeds the limit of 3");
}

#[test]
fn unreachable_local_is_stack_too_deep() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let first = b.declare("v0", SymbolKind::LocalVariable, u256);
    let second = b.declare("v1", SymbolKind::LocalVariable, u256);
    let too_deep = b.identifier(first);
    let reachable = b.identifier(second);

    let mut ctx = CompilerContext::default();
    for i in 0..17 {
        push_local(&mut ctx, &format!("v{}", i), word(i));
    }
    let result = compile_expression(&mut ctx, &sc, &too_deep);
    assert!(matches!(result, Err(CodegenError::StackTooDeep { .. })));
    assert_eq!(ctx.code_size(), 17);
    assert_eq!(ctx.stack_height(), 17);

    compile_expression(&mut ctx, &sc, &reachable).unwrap();
    assert_eq!(items_from(&ctx, 17), vec![op(Instruction::dup(16))]);
}

#[test]
fn code_size_limit_is_an_error() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let first = b.literal(1u64, u256);
    let second = b.literal(2u64, u256);

    let mut ctx = CompilerContext::new(CodegenOptions {
        max_code_size: 1,
        ..CodegenOptions::default()
    });
    compile_expression(&mut ctx, &sc, &first).unwrap();
    let result = compile_expression(&mut ctx, &sc, &second);
    match result {
        Err(CodegenError::CodeTooLarge { size, limit, .. }) => {
            assert_eq!(size, 2);
            assert_eq!(limit, 1);
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(ctx.items().to_vec(), vec![push(1)]);
}

#[test]
fn failing_bounds_check_aborts() {
    init_logging();
    let mut sc = SemanticContext::new();
    let u256 = uint(&mut sc, 256);
    let array_ty = sc
        .type_system
        .get_array_type(u256, Some(2), DataLocation::Storage);
    let mut b = TypedAstBuilder::new(&mut sc);
    let arr = b.declare("arr", SymbolKind::StateVariable, array_ty);
    let arr_use = b.identifier(arr);
    let index = b.literal(2u64, u256);
    let expr = b.index(arr_use, index);

    let mut ctx = CompilerContext::default();
    ctx.layout_state_variables(&sc.type_system, &[("arr", array_ty)]);
    compile_expression(&mut ctx, &sc, &expr).unwrap();

    let mut m = Machine::new(&ctx);
    assert_eq!(m.run(), Err(Fault::Invalid));
}

fn storage_array_in_mapping() -> (SemanticContext, SymbolId, TypeId) {
    let mut sc = SemanticContext::new();
    let u256 = uint(&mut sc, 256);
    let array_ty = sc.type_system.get_array_type(u256, None, DataLocation::Storage);
    let mapping_ty = sc.type_system.get_mapping_type(u256, array_ty);
    let m = TypedAstBuilder::new(&mut sc).declare("m", SymbolKind::StateVariable, mapping_ty);
    (sc, m, mapping_ty)
}

#[test]
#[should_panic(expected = "has no static length")]
fn storage_array_without_length_cannot_be_indexed() {
    let (mut sc, m, mapping_ty) = storage_array_in_mapping();
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let m_use = b.identifier(m);
    let key = b.literal(1u64, u256);
    let array = b.index(m_use, key);
    let position = b.literal(0u64, u256);
    let expr = b.index(array, position);

    let mut ctx = CompilerContext::default();
    ctx.layout_state_variables(&sc.type_system, &[("m", mapping_ty)]);
    let _ = compile_expression(&mut ctx, &sc, &expr);
}

#[test]
#[should_panic(expected = "has no static length")]
fn storage_array_without_length_has_no_length_member() {
    let (mut sc, m, mapping_ty) = storage_array_in_mapping();
    let u256 = uint(&mut sc, 256);
    let mut b = TypedAstBuilder::new(&mut sc);
    let m_use = b.identifier(m);
    let key = b.literal(1u64, u256);
    let array = b.index(m_use, key);
    let expr = b.member(array, "length");

    let mut ctx = CompilerContext::default();
    ctx.layout_state_variables(&sc.type_system, &[("m", mapping_ty)]);
    let _ = compile_expression(&mut ctx, &sc, &expr);
}
