//! Memory layout and small instruction sequences shared by the expression
//! compiler, the LValue implementation and the accessor generator.

use crate::context::CompilerContext;
use crate::instruction::Instruction;

use alloy_primitives::U256;
use sabre_frontend::typesystem::{DataLocation, TypeId, TypeKind, TypeSystem};

/// Start of the two scratch words used for hashing.
pub const SCRATCH_SPACE: u64 = 0x00;
/// Memory word holding the first unallocated address.
pub const FREE_MEMORY_POINTER: u64 = 0x40;
/// Where allocation starts.
pub const INITIAL_FREE_MEMORY: u64 = 0x80;

pub fn power_of_two(bits: usize) -> U256 {
    assert!(bits < 256, "2^{} does not fit a word", bits);
    U256::from(1u8) << bits
}

/// Mask covering the lowest `bytes` bytes of a word.
pub fn low_bytes_mask(bytes: u8) -> U256 {
    if bytes >= 32 {
        U256::MAX
    } else {
        power_of_two(bytes as usize * 8) - U256::from(1u8)
    }
}

pub fn initialise_free_memory_pointer(ctx: &mut CompilerContext) {
    ctx.push_u64(INITIAL_FREE_MEMORY);
    ctx.push_u64(FREE_MEMORY_POINTER);
    ctx.emit(Instruction::Mstore);
}

pub fn fetch_free_memory_pointer(ctx: &mut CompilerContext) {
    ctx.push_u64(FREE_MEMORY_POINTER);
    ctx.emit(Instruction::Mload);
}

pub fn add_constant_offset(ctx: &mut CompilerContext, offset: u64) {
    if offset != 0 {
        ctx.push_u64(offset);
        ctx.emit(Instruction::Add);
    }
}

/// Removes `count` words right below the top of the stack.
pub fn pop_below_top(ctx: &mut CompilerContext, count: usize) {
    for _ in 0..count {
        ctx.emit(Instruction::swap(1));
        ctx.emit(Instruction::Pop);
    }
}

/// Stops execution unless the word on top of the stack is non-zero.
/// Consumes the word.
pub fn append_abort_unless(ctx: &mut CompilerContext) {
    let ok = ctx.append_conditional_jump();
    ctx.emit(Instruction::Invalid);
    ctx.bind_label(ok);
}

/// `[slot key] -> [keccak(key . slot)]`, hashing through scratch memory.
pub fn compute_mapping_slot(ctx: &mut CompilerContext) {
    ctx.push_u64(SCRATCH_SPACE);
    ctx.emit(Instruction::Mstore);
    ctx.push_u64(SCRATCH_SPACE + 32);
    ctx.emit(Instruction::Mstore);
    ctx.push_u64(64);
    ctx.push_u64(SCRATCH_SPACE);
    ctx.emit(Instruction::Sha3);
}

/// `[size] -> [pointer]`. The area is zero-filled by copying from past the
/// end of the call data and the free memory pointer is bumped.
pub fn allocate_memory(ctx: &mut CompilerContext) {
    fetch_free_memory_pointer(ctx);
    ctx.emit(Instruction::dup(2));
    ctx.emit(Instruction::Calldatasize);
    ctx.emit(Instruction::dup(3));
    ctx.emit(Instruction::Calldatacopy);
    ctx.emit(Instruction::dup(1));
    ctx.emit(Instruction::swap(2));
    ctx.emit(Instruction::Add);
    ctx.push_u64(FREE_MEMORY_POINTER);
    ctx.emit(Instruction::Mstore);
}

/// `[] -> [pointer]`, takes `size` bytes at the free memory pointer without
/// clearing them. Later allocations start past the reserved area.
pub fn reserve_memory(ctx: &mut CompilerContext, size: u64) {
    fetch_free_memory_pointer(ctx);
    ctx.emit(Instruction::dup(1));
    add_constant_offset(ctx, size);
    ctx.push_u64(FREE_MEMORY_POINTER);
    ctx.emit(Instruction::Mstore);
}

/// Pushes a pointer to a fresh, zeroed memory object of a statically sized
/// type. Nested memory objects are allocated as well so that every pointer
/// member is valid.
pub fn allocate_zeroed(ctx: &mut CompilerContext, ts: &TypeSystem, ty: TypeId) {
    let size = match ts.memory_size(ty) {
        Some(size) => size,
        None => panic!(
            "Type {} has no static memory size",
            ts.type_name(ty)
        ),
    };
    ctx.push_u64(size);
    allocate_memory(ctx);

    let words: Vec<TypeId> = match ts.get_kind(ty) {
        TypeKind::Struct { members, .. } => members.iter().map(|(_, m)| *m).collect(),
        TypeKind::Array {
            element,
            length: Some(length),
            ..
        } => vec![*element; *length as usize],
        _ => vec![],
    };

    for (i, word_ty) in words.iter().enumerate() {
        if !ts.is_reference_type(*word_ty) {
            continue;
        }
        assert!(
            ts.data_location(*word_ty) == Some(DataLocation::Memory),
            "Memory objects cannot contain {}",
            ts.type_name(*word_ty)
        );
        match ts.memory_size(*word_ty) {
            Some(_) => allocate_zeroed(ctx, ts, *word_ty),
            None => {
                // An empty dynamic array is just its length word.
                ctx.push_u64(32);
                allocate_memory(ctx);
            }
        }
        ctx.emit(Instruction::dup(2));
        add_constant_offset(ctx, i as u64 * 32);
        ctx.emit(Instruction::Mstore);
    }
}
