use crate::compiler_utils::{
    add_constant_offset, append_abort_unless, compute_mapping_slot, pop_below_top,
};
use crate::context::CompilerContext;
use crate::conversion::convert;
use crate::error::Result;
use crate::expression::check_code_size;
use crate::instruction::Instruction;
use crate::lvalue::LValue;

use log::debug;
use sabre_frontend::semantic::SemanticContext;
use sabre_frontend::span::SpanLoc;
use sabre_frontend::symbol::{SymbolId, SymbolKind};
use sabre_frontend::typesystem::{DataLocation, TypeId, TypeKind, TypeSystem};

/// Generates the getter of a public state variable as an internal function
/// starting at the entry label of the variable's name.
///
/// Mappings and arrays take one key (resp. index) per nesting level, in
/// order. Structs return each of their value members, everything else a
/// single value. The caller pushes the return label and then the keys.
pub fn compile_state_variable_accessor(
    ctx: &mut CompilerContext,
    semantic_context: &SemanticContext,
    sym_id: SymbolId,
) -> Result<()> {
    let ts = &semantic_context.type_system;
    let sym = semantic_context.get_symbol(sym_id);
    assert!(
        sym.get_kind() == SymbolKind::StateVariable && sym.is_public(),
        "{} is not a public state variable",
        sym.get_name()
    );
    let ty = match sym.get_type() {
        Some(ty) => ty,
        None => panic!("State variable {} has no type", sym.get_name()),
    };
    let loc = sym.get_defining_point().unwrap_or_default();

    debug!("Generating accessor for {}", sym.get_name());
    let checkpoint = ctx.checkpoint();
    let result = append_accessor(ctx, ts, sym.get_name(), ty, loc)
        .and_then(|_| check_code_size(ctx, loc));
    if let Err(e) = &result {
        debug!("Discarding accessor for {}: {}", sym.get_name(), e);
        ctx.rollback(checkpoint);
    }
    result
}

fn append_accessor(
    ctx: &mut CompilerContext,
    ts: &TypeSystem,
    name: &str,
    ty: TypeId,
    loc: SpanLoc,
) -> Result<()> {
    let mut containers = vec![];
    let mut value_ty = ty;
    loop {
        match ts.get_kind(value_ty) {
            TypeKind::Mapping { value, .. } => {
                containers.push(value_ty);
                value_ty = *value;
            }
            TypeKind::Array {
                element,
                location: DataLocation::Storage,
                ..
            } => {
                containers.push(value_ty);
                value_ty = *element;
            }
            _ => break,
        }
    }
    let num_keys = containers.len();

    let entry_height = ctx.stack_height();
    let entry = ctx.function_entry_label(name);
    ctx.bind_label(entry);
    ctx.adjust_stack_height(1 + num_keys as isize);

    let location = ctx.storage_location(name);
    ctx.push(location.slot);
    for (i, container) in containers.iter().enumerate() {
        ctx.dup_stack_element(entry_height + 1 + i, loc)?;
        match ts.get_kind(*container) {
            TypeKind::Mapping { key, .. } => {
                convert(ctx, ts, *key, *key, true);
                compute_mapping_slot(ctx);
            }
            TypeKind::Array {
                element, length, ..
            } => {
                let length = match length {
                    Some(length) => *length,
                    None => panic!("Storage arrays have a fixed length"),
                };
                ctx.emit(Instruction::dup(1));
                ctx.push_u64(length);
                ctx.emit(Instruction::Gt);
                append_abort_unless(ctx);
                let element_slots = ts.storage_slots(*element);
                if element_slots != 1 {
                    ctx.push_u64(element_slots);
                    ctx.emit(Instruction::Mul);
                }
                ctx.emit(Instruction::Add);
            }
            _ => unreachable!(),
        }
    }
    pop_below_top(ctx, num_keys);

    let num_values = if ts.is_struct_type(value_ty) {
        let mut num_values = 0;
        for (member, member_ty) in ts.struct_members(value_ty) {
            if !ts.is_value_type(*member_ty) {
                continue;
            }
            let offset = ts.struct_member_storage_offset(value_ty, member);
            ctx.emit(Instruction::dup(1));
            add_constant_offset(ctx, offset.slot);
            LValue::StorageReference {
                ty: *member_ty,
                byte_offset: offset.byte_offset,
            }
            .retrieve(ctx, ts, loc, true)?;
            ctx.emit(Instruction::swap(1));
            num_values += 1;
        }
        ctx.emit(Instruction::Pop);
        num_values
    } else {
        assert!(
            ts.is_value_type(value_ty),
            "No accessor can return {}",
            ts.type_name(value_ty)
        );
        let byte_offset = if num_keys == 0 {
            location.byte_offset
        } else {
            0
        };
        LValue::StorageReference {
            ty: value_ty,
            byte_offset,
        }
        .retrieve(ctx, ts, loc, true)?;
        1
    };

    // Move the return label above the values.
    for i in 1..=num_values {
        ctx.emit(Instruction::swap(i));
    }
    ctx.emit(Instruction::Jump);
    ctx.set_stack_height(entry_height);
    Ok(())
}
