#![allow(dead_code)]

pub mod machine;

use sabre_codegen::assembly::AssemblyItem;
use sabre_codegen::context::CompilerContext;
use sabre_codegen::instruction::Instruction;
use sabre_frontend::semantic::SemanticContext;
use sabre_frontend::typesystem::TypeId;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn uint(sc: &mut SemanticContext, bits: u16) -> TypeId {
    sc.type_system.get_integer_type(bits, false)
}

pub fn int(sc: &mut SemanticContext, bits: u16) -> TypeId {
    sc.type_system.get_integer_type(bits, true)
}

/// Declares a local living in the next stack slot and pushes its initial
/// value.
pub fn push_local(ctx: &mut CompilerContext, name: &str, value: alloy_primitives::U256) {
    ctx.add_local_variable(name);
    ctx.push(value);
}

/// Items emitted after the first `start` ones.
pub fn items_from(ctx: &CompilerContext, start: usize) -> Vec<AssemblyItem> {
    ctx.items()[start..].to_vec()
}

pub fn op(ins: Instruction) -> AssemblyItem {
    AssemblyItem::Operation(ins)
}

pub fn push(value: u64) -> AssemblyItem {
    AssemblyItem::Push(alloy_primitives::U256::from(value))
}

pub fn contains_instruction(ctx: &CompilerContext, ins: Instruction) -> bool {
    ctx.items().iter().any(|item| *item == op(ins))
}
