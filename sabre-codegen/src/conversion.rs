use crate::compiler_utils::{low_bytes_mask, power_of_two};
use crate::context::CompilerContext;
use crate::instruction::Instruction;

use log::trace;
use sabre_frontend::typesystem::{TypeId, TypeKind, TypeSystem};

/// Converts the value on top of the stack from `source` to `target`.
///
/// Values are kept clean: no bits are set outside the width of their type
/// (signed values are sign extended instead). A conversion that may leave
/// bits outside the target width always masks them. `cleanup_needed` asks
/// for cleaning even when the conversion itself would not, for values that
/// may be dirty, e.g. read back from memory or about to be compared.
pub fn convert(
    ctx: &mut CompilerContext,
    ts: &TypeSystem,
    source: TypeId,
    target: TypeId,
    cleanup_needed: bool,
) {
    if source == target {
        if cleanup_needed && ts.is_value_type(target) {
            cleanup_high_bits(ctx, ts, target);
        }
        return;
    }

    trace!(
        "Converting {} to {}{}",
        ts.type_name(source),
        ts.type_name(target),
        if cleanup_needed { " with cleanup" } else { "" }
    );
    assert!(
        ts.is_explicitly_convertible(source, target),
        "Invalid type conversion from {} to {}",
        ts.type_name(source),
        ts.type_name(target)
    );

    match (ts.get_kind(source), ts.get_kind(target)) {
        (TypeKind::FixedBytes(from), TypeKind::FixedBytes(to)) => {
            if to < from {
                cleanup_high_bits(ctx, ts, target);
            } else if cleanup_needed {
                cleanup_high_bits(ctx, ts, source);
            }
        }
        (_, TypeKind::FixedBytes(size)) => {
            // Integer of the same width: move to the high-order end.
            if cleanup_needed {
                cleanup_high_bits(ctx, ts, source);
            }
            if *size < 32 {
                ctx.push(power_of_two(256 - *size as usize * 8));
                ctx.emit(Instruction::Mul);
            }
        }
        (TypeKind::FixedBytes(size), _) => {
            if *size < 32 {
                ctx.push(power_of_two(256 - *size as usize * 8));
                ctx.emit(Instruction::swap(1));
                ctx.emit(Instruction::Div);
            }
            if ts.is_signed(target) {
                cleanup_high_bits(ctx, ts, target);
            }
        }
        _ if ts.is_integer_like_type(source) && ts.is_integer_like_type(target) => {
            let source_bits = ts.num_bits(source);
            let target_bits = ts.num_bits(target);
            let source_signed = ts.is_signed(source);
            let target_signed = ts.is_signed(target);
            if target_bits > source_bits {
                // Widening: only the source width can be dirty.
                cleanup_high_bits(ctx, ts, source);
                if source_signed && !target_signed {
                    cleanup_high_bits(ctx, ts, target);
                }
            } else if cleanup_needed || target_bits < source_bits || source_signed != target_signed
            {
                cleanup_high_bits(ctx, ts, target);
            }
        }
        _ => panic!(
            "Invalid type conversion from {} to {}",
            ts.type_name(source),
            ts.type_name(target)
        ),
    }
}

/// Clears (or sign-extends over) the bits of the top word that lie outside
/// the width of `ty`.
pub fn cleanup_high_bits(ctx: &mut CompilerContext, ts: &TypeSystem, ty: TypeId) {
    match ts.get_kind(ty) {
        TypeKind::Bool => {
            ctx.emit(Instruction::Iszero);
            ctx.emit(Instruction::Iszero);
        }
        TypeKind::FixedBytes(size) => {
            if *size < 32 {
                ctx.push(!low_bytes_mask(32 - *size));
                ctx.emit(Instruction::And);
            }
        }
        TypeKind::Integer { .. } | TypeKind::Address | TypeKind::Contract(..) => {
            let bits = ts.num_bits(ty);
            if bits == 256 {
                return;
            }
            if ts.is_signed(ty) {
                ctx.push_u64(bits as u64 / 8 - 1);
                ctx.emit(Instruction::Signextend);
            } else {
                ctx.push(low_bytes_mask((bits / 8) as u8));
                ctx.emit(Instruction::And);
            }
        }
        _ => panic!("Type {} has no high-order bits to clean", ts.type_name(ty)),
    }
}
