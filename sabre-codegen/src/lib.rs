#[macro_use]
extern crate lazy_static;

mod abi;
pub mod accessor;
pub mod assembly;
mod call;
pub mod compiler_utils;
pub mod context;
pub mod conversion;
pub mod error;
pub mod expression;
pub mod instruction;
pub mod lvalue;
pub mod options;

pub use accessor::compile_state_variable_accessor;
pub use context::CompilerContext;
pub use error::CodegenError;
pub use expression::compile_expression;
pub use options::CodegenOptions;

use sabre_frontend::typesystem::{TypeId, TypeSystem};

/// Converts the value on top of the stack, see `conversion::convert`.
pub fn compile_type_conversion(
    ctx: &mut CompilerContext,
    ts: &TypeSystem,
    source: TypeId,
    target: TypeId,
    cleanup_needed: bool,
) {
    conversion::convert(ctx, ts, source, target, cleanup_needed)
}
