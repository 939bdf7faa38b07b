use crate::compiler_utils::add_constant_offset;
use crate::conversion::convert;
use crate::error::Result;
use crate::expression::ExpressionCompiler;
use crate::instruction::Instruction;
use crate::lvalue::LValue;

use sabre_frontend::ast::Expr;
use sabre_frontend::span::{SpanLoc, SpannedBox};
use sabre_frontend::typesystem::{DataLocation, TypeId, TypeKind, TypeSystem};

impl<'a> ExpressionCompiler<'a> {
    /// Evaluates `args` and writes their encoding to memory at
    /// `base + offset`, where `base` is the memory address held at stack
    /// position `base_position`. Each argument is converted to its parameter
    /// type, or kept in its own type when `types` is None. Returns the number
    /// of bytes written.
    pub(crate) fn append_argument_copy_to_memory(
        &mut self,
        types: Option<&[TypeId]>,
        args: &[SpannedBox<Expr>],
        base_position: usize,
        offset: u64,
    ) -> Result<u64> {
        if let Some(types) = types {
            assert_eq!(
                types.len(),
                args.len(),
                "Argument count does not match the parameter count"
            );
        }
        let mut length = 0;
        for (i, arg) in args.iter().enumerate() {
            let target = types.map(|t| t[i]).unwrap_or_else(|| self.get_type(arg));
            length += self.append_argument_to_memory(arg, target, base_position, offset + length)?;
        }
        Ok(length)
    }

    /// Bytes written by `append_argument_copy_to_memory` for `args`.
    pub(crate) fn encoded_arguments_size(
        &self,
        types: Option<&[TypeId]>,
        args: &[SpannedBox<Expr>],
    ) -> u64 {
        let ts = self.ts();
        args.iter()
            .enumerate()
            .map(|(i, arg)| {
                let target = types.map(|t| t[i]).unwrap_or_else(|| self.get_type(arg));
                encoded_size(ts, target)
            })
            .sum()
    }

    /// Encodes a single argument as `target`, see
    /// `append_argument_copy_to_memory`.
    pub(crate) fn append_argument_to_memory(
        &mut self,
        arg: &SpannedBox<Expr>,
        target: TypeId,
        base_position: usize,
        offset: u64,
    ) -> Result<u64> {
        let ts = self.ts();
        let arg_ty = self.get_type(arg);
        self.compile(arg)?;
        convert(self.ctx, ts, arg_ty, target, true);
        self.store_in_memory(target, base_position, offset, *arg.loc())
    }

    /// `[value] -> []`, writes the encoding of a value of type `ty` at
    /// `base + offset`. Returns the number of bytes written.
    pub(crate) fn store_in_memory(
        &mut self,
        ty: TypeId,
        base_position: usize,
        offset: u64,
        loc: SpanLoc,
    ) -> Result<u64> {
        let ts = self.ts();
        if ts.is_value_type(ty) {
            self.ctx.dup_stack_element(base_position, loc)?;
            add_constant_offset(self.ctx, offset);
            self.ctx.emit(Instruction::Mstore);
            return Ok(32);
        }

        let words = encoded_size(ts, ty) / 32;
        match ts.data_location(ty) {
            Some(DataLocation::Memory) => {
                assert_flat(ts, ty);
                for i in 0..words {
                    self.ctx.emit(Instruction::dup(1));
                    add_constant_offset(self.ctx, i * 32);
                    self.ctx.emit(Instruction::Mload);
                    self.ctx.dup_stack_element(base_position, loc)?;
                    add_constant_offset(self.ctx, offset + i * 32);
                    self.ctx.emit(Instruction::Mstore);
                }
                self.ctx.emit(Instruction::Pop);
                Ok(words * 32)
            }
            Some(DataLocation::Storage) => {
                let leaves = flat_storage_leaves(ts, ty);
                for (i, (slot, byte_offset, leaf_ty)) in leaves.iter().enumerate() {
                    self.ctx.emit(Instruction::dup(1));
                    add_constant_offset(self.ctx, *slot);
                    LValue::StorageReference {
                        ty: *leaf_ty,
                        byte_offset: *byte_offset,
                    }
                    .retrieve(self.ctx, ts, loc, true)?;
                    self.ctx.dup_stack_element(base_position, loc)?;
                    add_constant_offset(self.ctx, offset + i as u64 * 32);
                    self.ctx.emit(Instruction::Mstore);
                }
                self.ctx.emit(Instruction::Pop);
                Ok(words * 32)
            }
            None => panic!("Type {} cannot be encoded", ts.type_name(ty)),
        }
    }
}

pub(crate) fn encoded_size(ts: &TypeSystem, ty: TypeId) -> u64 {
    match ts.abi_encoded_size(ty) {
        Some(size) => size,
        None => panic!("Type {} cannot be encoded statically", ts.type_name(ty)),
    }
}

fn assert_statically_encodable(ts: &TypeSystem, ty: TypeId, word_ty: TypeId) {
    assert!(
        ts.is_value_type(word_ty),
        "Type {} cannot be encoded statically",
        ts.type_name(ty)
    );
}

/// Memory objects are copied word by word, so every word must be a value.
fn assert_flat(ts: &TypeSystem, ty: TypeId) {
    match ts.get_kind(ty) {
        TypeKind::Struct { members, .. } => {
            for (_, member_ty) in members {
                assert_statically_encodable(ts, ty, *member_ty);
            }
        }
        TypeKind::Array {
            element,
            length: Some(_),
            ..
        } => assert_statically_encodable(ts, ty, *element),
        _ => panic!("Type {} cannot be encoded statically", ts.type_name(ty)),
    }
}

/// Slot offset, byte offset and type of every value of a storage struct or
/// fixed array whose members are all values.
fn flat_storage_leaves(ts: &TypeSystem, ty: TypeId) -> Vec<(u64, u8, TypeId)> {
    match ts.get_kind(ty) {
        TypeKind::Struct { members, .. } => members
            .iter()
            .map(|(name, member_ty)| {
                assert_statically_encodable(ts, ty, *member_ty);
                let offset = ts.struct_member_storage_offset(ty, name);
                (offset.slot, offset.byte_offset, *member_ty)
            })
            .collect(),
        TypeKind::Array {
            element,
            length: Some(length),
            ..
        } => {
            assert_statically_encodable(ts, ty, *element);
            let element_slots = ts.storage_slots(*element);
            (0..*length)
                .map(|i| (i * element_slots, 0, *element))
                .collect()
        }
        _ => panic!("Type {} cannot be encoded statically", ts.type_name(ty)),
    }
}
