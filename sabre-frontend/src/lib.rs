#[macro_use]
extern crate lazy_static;

pub mod utils;
pub mod span;
pub mod ast;
pub mod builder;
pub mod constant;
pub mod diagnostics;
pub mod semantic;
pub mod symbol;
pub mod typesystem;
