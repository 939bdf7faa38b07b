use crate::compiler_utils::{self, add_constant_offset, low_bytes_mask, power_of_two};
use crate::context::CompilerContext;
use crate::error::{CodegenError, Result};
use crate::instruction::Instruction;

use sabre_frontend::span::SpanLoc;
use sabre_frontend::typesystem::{TypeId, TypeSystem};

/// A place a value can be read from and written to.
///
/// Stack slots are addressed statically through the tracked stack height, so
/// they have no run-time reference. Memory and storage references keep the
/// address (resp. the slot) as one word on the stack for as long as the
/// location is live. Storage values may be packed: the byte offset inside the
/// slot is always known at compile time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LValue {
    #[default]
    None,
    StackSlot {
        base_offset: usize,
        size: usize,
    },
    MemoryReference {
        ty: TypeId,
    },
    StorageReference {
        ty: TypeId,
        byte_offset: u8,
    },
}

impl LValue {
    pub fn from_local(ctx: &CompilerContext, ts: &TypeSystem, name: &str, ty: TypeId) -> LValue {
        LValue::StackSlot {
            base_offset: ctx.local_offset(name),
            size: ts.stack_size(ty),
        }
    }

    /// Pushes the slot of the state variable and returns the location.
    pub fn from_state_variable(ctx: &mut CompilerContext, name: &str, ty: TypeId) -> LValue {
        let location = ctx.storage_location(name);
        ctx.push(location.slot);
        LValue::StorageReference {
            ty,
            byte_offset: location.byte_offset,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, LValue::None)
    }

    pub fn stores_reference_on_stack(&self) -> bool {
        matches!(
            self,
            LValue::MemoryReference { .. } | LValue::StorageReference { .. }
        )
    }

    /// Words the live location keeps on the stack.
    pub fn reference_size(&self) -> usize {
        if self.stores_reference_on_stack() {
            1
        } else {
            0
        }
    }

    pub fn reset(&mut self) {
        *self = LValue::None;
    }

    /// Pushes the value. With `remove` the reference word, if any, is
    /// consumed.
    pub fn retrieve(
        &self,
        ctx: &mut CompilerContext,
        ts: &TypeSystem,
        loc: SpanLoc,
        remove: bool,
    ) -> Result<()> {
        match self {
            LValue::None => panic!("Retrieving the value of an invalid location"),
            LValue::StackSlot { base_offset, size } => {
                let stack_pos = ctx.base_to_current_stack_offset(*base_offset);
                if stack_pos + 1 > 16 {
                    return Err(CodegenError::StackTooDeep { loc });
                }
                for _ in 0..*size {
                    ctx.emit(Instruction::dup(stack_pos + 1));
                }
            }
            LValue::MemoryReference { .. } => {
                if !remove {
                    ctx.emit(Instruction::dup(1));
                }
                ctx.emit(Instruction::Mload);
            }
            LValue::StorageReference { ty, byte_offset } => {
                if !ts.is_value_type(*ty) {
                    // The slot is the value of a storage reference type.
                    assert_eq!(*byte_offset, 0, "Reference types start a new slot");
                    if !remove {
                        ctx.emit(Instruction::dup(1));
                    }
                    return Ok(());
                }
                if !remove {
                    ctx.emit(Instruction::dup(1));
                }
                ctx.emit(Instruction::Sload);
                unpack_storage_value(ctx, ts, *ty, *byte_offset);
            }
        }
        Ok(())
    }

    /// `[value reference] -> [value?]`, the reference word is only there for
    /// memory and storage locations. With `is_move` the value is consumed,
    /// otherwise a copy of it is left on the stack.
    pub fn store(
        &self,
        ctx: &mut CompilerContext,
        ts: &TypeSystem,
        loc: SpanLoc,
        is_move: bool,
    ) -> Result<()> {
        match self {
            LValue::None => panic!("Storing into an invalid location"),
            LValue::StackSlot { base_offset, size } => {
                let stack_diff = ctx.base_to_current_stack_offset(*base_offset) + 1 - size;
                if stack_diff > 16 {
                    return Err(CodegenError::StackTooDeep { loc });
                }
                if stack_diff > 0 {
                    for _ in 0..*size {
                        ctx.emit(Instruction::swap(stack_diff));
                        ctx.emit(Instruction::Pop);
                    }
                }
                if !is_move {
                    self.retrieve(ctx, ts, loc, false)?;
                }
            }
            LValue::MemoryReference { .. } => {
                if !is_move {
                    ctx.emit(Instruction::dup(2));
                    ctx.emit(Instruction::swap(1));
                }
                ctx.emit(Instruction::Mstore);
            }
            LValue::StorageReference { ty, byte_offset } => {
                if !is_move {
                    ctx.emit(Instruction::dup(2));
                    ctx.emit(Instruction::swap(1));
                }
                if ts.is_value_type(*ty) {
                    store_packed_value(ctx, ts, *ty, *byte_offset);
                } else {
                    assert!(
                        !ts.is_mapping_type(*ty),
                        "Mappings cannot be assigned to"
                    );
                    copy_storage_slots(ctx, ts.storage_slots(*ty));
                }
            }
        }
        Ok(())
    }

    /// Resets the location to the zero value of its type. The reference is
    /// consumed.
    pub fn set_to_zero(&self, ctx: &mut CompilerContext, ts: &TypeSystem, loc: SpanLoc) -> Result<()> {
        match self {
            LValue::None => panic!("Deleting an invalid location"),
            LValue::StackSlot { base_offset, size } => {
                let stack_diff = ctx.base_to_current_stack_offset(*base_offset);
                if stack_diff + 1 > 16 {
                    return Err(CodegenError::StackTooDeep { loc });
                }
                for i in 0..*size {
                    ctx.push_u64(0);
                    ctx.emit(Instruction::swap(stack_diff + 1 - i));
                    ctx.emit(Instruction::Pop);
                }
            }
            LValue::MemoryReference { ty } => {
                if ts.is_reference_type(*ty) {
                    // Point the member at a fresh zeroed object.
                    match ts.memory_size(*ty) {
                        Some(_) => compiler_utils::allocate_zeroed(ctx, ts, *ty),
                        None => {
                            ctx.push_u64(32);
                            compiler_utils::allocate_memory(ctx);
                        }
                    }
                } else {
                    ctx.push_u64(0);
                }
                ctx.emit(Instruction::swap(1));
                ctx.emit(Instruction::Mstore);
            }
            LValue::StorageReference { ty, byte_offset } => {
                if ts.is_mapping_type(*ty) {
                    // The contents of a mapping are not enumerable.
                    ctx.emit(Instruction::Pop);
                } else if ts.is_value_type(*ty) {
                    let size = ts.storage_bytes(*ty);
                    if size == 32 {
                        ctx.push_u64(0);
                        ctx.emit(Instruction::swap(1));
                        ctx.emit(Instruction::Sstore);
                    } else {
                        ctx.emit(Instruction::dup(1));
                        ctx.emit(Instruction::Sload);
                        ctx.push(!(low_bytes_mask(size) << (*byte_offset as usize * 8)));
                        ctx.emit(Instruction::And);
                        ctx.emit(Instruction::swap(1));
                        ctx.emit(Instruction::Sstore);
                    }
                } else {
                    for i in 0..ts.storage_slots(*ty) {
                        ctx.push_u64(0);
                        ctx.emit(Instruction::dup(2));
                        add_constant_offset(ctx, i);
                        ctx.emit(Instruction::Sstore);
                    }
                    ctx.emit(Instruction::Pop);
                }
            }
        }
        Ok(())
    }

    /// Turns the location into its value unless the node it was created for
    /// is an assignment target.
    pub fn retrieve_if_not_requested(
        &mut self,
        ctx: &mut CompilerContext,
        ts: &TypeSystem,
        loc: SpanLoc,
        requested: bool,
    ) -> Result<()> {
        if !requested {
            self.retrieve(ctx, ts, loc, true)?;
            self.reset();
        }
        Ok(())
    }
}

/// `[slot_word] -> [value]` for a value stored `size` bytes wide at
/// `byte_offset`.
fn unpack_storage_value(ctx: &mut CompilerContext, ts: &TypeSystem, ty: TypeId, byte_offset: u8) {
    let size = ts.storage_bytes(ty);
    if size == 32 {
        return;
    }
    if byte_offset > 0 {
        ctx.push(power_of_two(byte_offset as usize * 8));
        ctx.emit(Instruction::swap(1));
        ctx.emit(Instruction::Div);
    }
    if ts.is_signed(ty) {
        ctx.push_u64(size as u64 - 1);
        ctx.emit(Instruction::Signextend);
    } else {
        ctx.push(low_bytes_mask(size));
        ctx.emit(Instruction::And);
    }
    if ts.is_fixed_bytes_type(ty) {
        // Fixed bytes are left aligned on the stack.
        ctx.push(power_of_two((32 - size as usize) * 8));
        ctx.emit(Instruction::Mul);
    }
}

/// `[value slot] -> []`, read-modify-write for packed values.
fn store_packed_value(ctx: &mut CompilerContext, ts: &TypeSystem, ty: TypeId, byte_offset: u8) {
    let size = ts.storage_bytes(ty);
    if size == 32 {
        ctx.emit(Instruction::Sstore);
        return;
    }
    ctx.emit(Instruction::swap(1));
    if ts.is_fixed_bytes_type(ty) {
        ctx.push(power_of_two((32 - size as usize) * 8));
        ctx.emit(Instruction::swap(1));
        ctx.emit(Instruction::Div);
    }
    ctx.push(low_bytes_mask(size));
    ctx.emit(Instruction::And);
    if byte_offset > 0 {
        ctx.push(power_of_two(byte_offset as usize * 8));
        ctx.emit(Instruction::Mul);
    }
    ctx.emit(Instruction::dup(2));
    ctx.emit(Instruction::Sload);
    ctx.push(!(low_bytes_mask(size) << (byte_offset as usize * 8)));
    ctx.emit(Instruction::And);
    ctx.emit(Instruction::Or);
    ctx.emit(Instruction::swap(1));
    ctx.emit(Instruction::Sstore);
}

/// `[source_slot target_slot] -> []`, copies `slots` consecutive slots.
fn copy_storage_slots(ctx: &mut CompilerContext, slots: u64) {
    for i in 0..slots {
        ctx.emit(Instruction::dup(2));
        add_constant_offset(ctx, i);
        ctx.emit(Instruction::Sload);
        ctx.emit(Instruction::dup(2));
        add_constant_offset(ctx, i);
        ctx.emit(Instruction::Sstore);
    }
    ctx.emit(Instruction::Pop);
    ctx.emit(Instruction::Pop);
}
