use crate::abi::encoded_size;
use crate::compiler_utils::{
    self, append_abort_unless, pop_below_top, power_of_two, reserve_memory,
};
use crate::conversion::{cleanup_high_bits, convert};
use crate::error::Result;
use crate::expression::ExpressionCompiler;
use crate::instruction::Instruction;

use log::trace;
use sabre_frontend::ast::{Expr, ExprFunctionCall};
use sabre_frontend::span::{SpanLoc, SpannedBox};
use sabre_frontend::typesystem::{DataLocation, FunctionKind, TypeId, TypeKind};

/// Gas kept back by the caller when no explicit amount is given.
const CALL_GAS_RESERVE: u64 = 25;
/// Precompile whose 20 byte result comes right aligned.
const RIPEMD160_PRECOMPILE: u8 = 3;

/// What happens after the CALL instruction when the callee failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePolicy {
    /// Execution stops with INVALID.
    Abort,
    /// The success flag is the result of the call.
    PushSuccess,
}

/// The input area of a message call.
enum CallPayload<'e> {
    /// Arguments encoded into memory reserved at the free memory pointer,
    /// optionally preceded by the 4 byte selector found at `selector_position`. Without `params`
    /// each argument is encoded in its own type.
    Encoded {
        selector_position: Option<usize>,
        params: Option<&'e [TypeId]>,
        args: &'e [SpannedBox<Expr>],
    },
    /// The elements of a memory array are sent as they are.
    Verbatim(&'e SpannedBox<Expr>),
}

/// A message call to the address at `address_position`. Positions are
/// absolute stack positions of words that were pushed before the call.
struct MessageCall<'e> {
    address_position: usize,
    gas_position: Option<usize>,
    value_position: Option<usize>,
    payload: CallPayload<'e>,
    return_type: Option<TypeId>,
    failure_policy: FailurePolicy,
    return_shift_bits: usize,
    loc: SpanLoc,
}

impl<'a> ExpressionCompiler<'a> {
    pub(crate) fn compile_function_call(
        &mut self,
        expr: &SpannedBox<Expr>,
        e: &ExprFunctionCall,
    ) -> Result<()> {
        let ExprFunctionCall(callee, args, options) = e;
        let ts = self.ts();
        let callee_ty = self.get_type(callee);
        let ty = self.get_type(expr);
        let loc = *expr.loc();

        if let TypeKind::TypeType(target) = ts.get_kind(callee_ty) {
            assert_eq!(args.len(), 1, "A type conversion takes one argument");
            let arg_ty = self.get_type(&args[0]);
            self.compile(&args[0])?;
            convert(self.ctx, ts, arg_ty, *target, false);
            return Ok(());
        }

        let function_type = ts.function_type(callee_ty);
        trace!("Calling a {:?} function at {}", function_type.kind, loc);
        let height_before = self.ctx.stack_height();
        match &function_type.kind {
            FunctionKind::Internal => {
                let params = &function_type.params;
                let num_returns = function_type.returns.len();
                assert_eq!(args.len(), params.len(), "Wrong number of arguments");

                let return_label = self.ctx.push_new_tag();
                for (arg, param) in args.iter().zip(params) {
                    let arg_ty = self.get_type(arg);
                    self.compile(arg)?;
                    convert(self.ctx, ts, arg_ty, *param, false);
                }
                self.compile(callee)?;
                self.ctx.emit(Instruction::Jump);

                // The callee consumes the return label and the arguments.
                self.ctx
                    .adjust_stack_height(num_returns as isize - params.len() as isize - 1);
                self.ctx.bind_label(return_label);
                for _ in 1..num_returns {
                    self.ctx.emit(Instruction::Pop);
                }
            }
            FunctionKind::External { .. } => {
                self.compile(callee)?;
                let (gas_position, value_position) = self.compile_call_options(options)?;
                self.append_message_call(MessageCall {
                    address_position: height_before,
                    gas_position,
                    value_position,
                    payload: CallPayload::Encoded {
                        selector_position: Some(height_before + 1),
                        params: Some(&function_type.params),
                        args,
                    },
                    return_type: function_type.returns.first().copied(),
                    failure_policy: FailurePolicy::Abort,
                    return_shift_bits: 0,
                    loc,
                })?;
            }
            FunctionKind::Bare => {
                self.compile(callee)?;
                let (gas_position, value_position) = self.compile_call_options(options)?;
                let payload = match args.as_slice() {
                    [arg] if is_memory_dynamic_array(self, arg) => CallPayload::Verbatim(arg),
                    _ => CallPayload::Encoded {
                        selector_position: None,
                        params: None,
                        args,
                    },
                };
                self.append_message_call(MessageCall {
                    address_position: height_before,
                    gas_position,
                    value_position,
                    payload,
                    return_type: None,
                    failure_policy: FailurePolicy::PushSuccess,
                    return_shift_bits: 0,
                    loc,
                })?;
            }
            FunctionKind::Send => {
                assert_eq!(args.len(), 1, "send takes the amount");
                self.compile(callee)?;
                // Only the stipend of a value transfer is available.
                self.ctx.push_u64(0);
                let gas_position = self.ctx.stack_height() - 1;
                let value_ty = self.get_type(&args[0]);
                self.compile(&args[0])?;
                convert(self.ctx, ts, value_ty, function_type.params[0], true);
                let value_position = self.ctx.stack_height() - 1;
                self.append_message_call(MessageCall {
                    address_position: height_before,
                    gas_position: Some(gas_position),
                    value_position: Some(value_position),
                    payload: CallPayload::Encoded {
                        selector_position: None,
                        params: Some(&[]),
                        args: &[],
                    },
                    return_type: None,
                    failure_policy: FailurePolicy::PushSuccess,
                    return_shift_bits: 0,
                    loc,
                })?;
            }
            FunctionKind::Precompile(address) => {
                self.compile(callee)?;
                self.ctx.push_u64(*address as u64);
                let return_shift_bits = if *address == RIPEMD160_PRECOMPILE {
                    96
                } else {
                    0
                };
                self.append_message_call(MessageCall {
                    address_position: height_before,
                    gas_position: None,
                    value_position: None,
                    payload: CallPayload::Encoded {
                        selector_position: None,
                        params: Some(&function_type.params),
                        args,
                    },
                    return_type: function_type.returns.first().copied(),
                    failure_policy: FailurePolicy::Abort,
                    return_shift_bits,
                    loc,
                })?;
            }
            FunctionKind::Sha3 => {
                self.compile(callee)?;
                let size = self.encoded_arguments_size(None, args);
                reserve_memory(self.ctx, size);
                let base_position = self.ctx.stack_height() - 1;
                let length = self.append_argument_copy_to_memory(None, args, base_position, 0)?;
                self.ctx.push_u64(length);
                self.ctx.emit(Instruction::swap(1));
                self.ctx.emit(Instruction::Sha3);
            }
            FunctionKind::Log(num_topics) => {
                let num_topics = *num_topics as usize;
                assert_eq!(
                    args.len(),
                    num_topics + 1,
                    "log{} takes the data and {} topics",
                    num_topics,
                    num_topics
                );
                self.compile(callee)?;
                // The first topic has to end up right below the data.
                for topic in args[1..].iter().rev() {
                    let topic_ty = self.get_type(topic);
                    self.compile(topic)?;
                    cleanup_high_bits(self.ctx, ts, topic_ty);
                }
                self.append_log(&args[..1], None, num_topics)?;
            }
            FunctionKind::Event { topic, indexed } => {
                let params = &function_type.params;
                assert_eq!(args.len(), params.len(), "Wrong number of event arguments");
                assert_eq!(indexed.len(), params.len(), "Event parameters without flags");
                self.compile(callee)?;

                let mut num_topics = 1;
                for (i, arg) in args.iter().enumerate().rev() {
                    if indexed[i] {
                        let arg_ty = self.get_type(arg);
                        self.compile(arg)?;
                        convert(self.ctx, ts, arg_ty, params[i], true);
                        num_topics += 1;
                    }
                }
                self.ctx.push(*topic);

                let data_size: u64 = params
                    .iter()
                    .zip(indexed)
                    .filter(|(_, indexed)| !**indexed)
                    .map(|(param, _)| encoded_size(ts, *param))
                    .sum();
                reserve_memory(self.ctx, data_size);
                let base_position = self.ctx.stack_height() - 1;
                let mut length = 0;
                for (i, arg) in args.iter().enumerate() {
                    if !indexed[i] {
                        length +=
                            self.append_argument_to_memory(arg, params[i], base_position, length)?;
                    }
                }
                self.ctx.push_u64(length);
                self.ctx.emit(Instruction::swap(1));
                self.ctx.emit(Instruction::log(num_topics));
            }
            FunctionKind::Selfdestruct => {
                assert_eq!(args.len(), 1, "selfdestruct takes the beneficiary");
                self.compile(callee)?;
                let arg_ty = self.get_type(&args[0]);
                self.compile(&args[0])?;
                convert(self.ctx, ts, arg_ty, ts.get_address_type(), true);
                self.ctx.emit(Instruction::Selfdestruct);
            }
            FunctionKind::Creation => {
                self.compile(callee)?;
                self.append_creation(function_type.params.as_slice(), ty, args, options, loc)?;
            }
            FunctionKind::ArrayAllocation => {
                assert_eq!(args.len(), 1, "Array allocation takes the length");
                self.compile(callee)?;
                let arg_ty = self.get_type(&args[0]);
                self.compile(&args[0])?;
                convert(self.ctx, ts, arg_ty, function_type.params[0], true);
                // Length word followed by the elements.
                self.ctx.emit(Instruction::dup(1));
                self.ctx.push_u64(32);
                self.ctx.emit(Instruction::Mul);
                compiler_utils::add_constant_offset(self.ctx, 32);
                compiler_utils::allocate_memory(self.ctx);
                self.ctx.emit(Instruction::swap(1));
                self.ctx.emit(Instruction::dup(2));
                self.ctx.emit(Instruction::Mstore);
            }
        }
        Ok(())
    }

    /// Compiles the explicit gas and value of a call and returns their stack
    /// positions.
    fn compile_call_options(
        &mut self,
        options: &sabre_frontend::ast::CallOptions,
    ) -> Result<(Option<usize>, Option<usize>)> {
        let ts = self.ts();
        let mut positions = [None, None];
        for (position, option) in positions.iter_mut().zip([&options.gas, &options.value]) {
            if let Some(option) = option {
                let option_ty = self.get_type(option);
                self.compile(option)?;
                cleanup_high_bits(self.ctx, ts, option_ty);
                *position = Some(self.ctx.stack_height() - 1);
            }
        }
        Ok((positions[0], positions[1]))
    }

    /// `[address ...] -> [result]`, everything from the address up is
    /// replaced by the return value or the success flag.
    fn append_message_call(&mut self, call: MessageCall) -> Result<()> {
        let ts = self.ts();
        let loc = call.loc;

        // Input area: [in_offset in_size]
        match call.payload {
            CallPayload::Encoded {
                selector_position,
                params,
                args,
            } => {
                let selector_size = if selector_position.is_some() { 4 } else { 0 };
                let size = selector_size + self.encoded_arguments_size(params, args);
                reserve_memory(self.ctx, size);
                let base_position = self.ctx.stack_height() - 1;
                let mut offset = 0;
                if let Some(selector_position) = selector_position {
                    self.ctx.dup_stack_element(selector_position, loc)?;
                    self.ctx.push(power_of_two(224));
                    self.ctx.emit(Instruction::Mul);
                    self.ctx.dup_stack_element(base_position, loc)?;
                    self.ctx.emit(Instruction::Mstore);
                    offset = 4;
                }
                let length =
                    self.append_argument_copy_to_memory(params, args, base_position, offset)?;
                self.ctx.push_u64(offset + length);
            }
            CallPayload::Verbatim(arg) => {
                self.compile(arg)?;
                self.ctx.emit(Instruction::dup(1));
                self.ctx.emit(Instruction::Mload);
                self.ctx.push_u64(32);
                self.ctx.emit(Instruction::Mul);
                self.ctx.emit(Instruction::swap(1));
                compiler_utils::add_constant_offset(self.ctx, 32);
                self.ctx.emit(Instruction::swap(1));
            }
        }
        let in_offset_position = self.ctx.stack_height() - 2;
        let in_size_position = self.ctx.stack_height() - 1;

        // The output overwrites the input.
        self.ctx
            .push_u64(if call.return_type.is_some() { 32 } else { 0 });
        self.ctx.dup_stack_element(in_offset_position, loc)?;
        self.ctx.dup_stack_element(in_size_position, loc)?;
        self.ctx.dup_stack_element(in_offset_position, loc)?;
        match call.value_position {
            Some(position) => self.ctx.dup_stack_element(position, loc)?,
            None => self.ctx.push_u64(0),
        }
        self.ctx.dup_stack_element(call.address_position, loc)?;
        match call.gas_position {
            Some(position) => self.ctx.dup_stack_element(position, loc)?,
            None => {
                self.ctx.push_u64(CALL_GAS_RESERVE);
                self.ctx.emit(Instruction::Gas);
                self.ctx.emit(Instruction::Sub);
            }
        }
        self.ctx.emit(Instruction::Call);

        match call.failure_policy {
            FailurePolicy::Abort => append_abort_unless(self.ctx),
            FailurePolicy::PushSuccess => {
                let count = self.ctx.stack_height() - 1 - call.address_position;
                pop_below_top(self.ctx, count);
                return Ok(());
            }
        }

        match call.return_type {
            Some(return_type) => {
                assert!(
                    ts.is_value_type(return_type),
                    "Calls cannot return {}",
                    ts.type_name(return_type)
                );
                self.ctx.emit(Instruction::Pop);
                self.ctx.emit(Instruction::Mload);
                if call.return_shift_bits > 0 {
                    self.ctx.push(power_of_two(call.return_shift_bits));
                    self.ctx.emit(Instruction::Mul);
                }
                cleanup_high_bits(self.ctx, ts, return_type);
                let count = self.ctx.stack_height() - 1 - call.address_position;
                pop_below_top(self.ctx, count);
            }
            None => {
                while self.ctx.stack_height() > call.address_position {
                    self.ctx.emit(Instruction::Pop);
                }
            }
        }
        Ok(())
    }

    /// `[topic_n .. topic_1] -> []`, logs `data` encoded into freshly
    /// reserved memory.
    fn append_log(
        &mut self,
        data: &[SpannedBox<Expr>],
        params: Option<&[TypeId]>,
        num_topics: usize,
    ) -> Result<()> {
        let size = self.encoded_arguments_size(params, data);
        reserve_memory(self.ctx, size);
        let base_position = self.ctx.stack_height() - 1;
        let length = self.append_argument_copy_to_memory(params, data, base_position, 0)?;
        self.ctx.push_u64(length);
        self.ctx.emit(Instruction::swap(1));
        self.ctx.emit(Instruction::log(num_topics));
        Ok(())
    }

    /// Deploys a contract whose code was registered earlier, passing the
    /// encoded constructor arguments after the code.
    fn append_creation(
        &mut self,
        params: &[TypeId],
        created: TypeId,
        args: &[SpannedBox<Expr>],
        options: &sabre_frontend::ast::CallOptions,
        loc: SpanLoc,
    ) -> Result<()> {
        let ts = self.ts();
        let name = match ts.get_kind(created) {
            TypeKind::Contract(name) => name,
            _ => panic!("Cannot create an object of type {}", ts.type_name(created)),
        };
        assert!(options.gas.is_none(), "Contract creation takes no gas option");

        let value_position = match &options.value {
            Some(value) => {
                let value_ty = self.get_type(value);
                self.compile(value)?;
                cleanup_high_bits(self.ctx, ts, value_ty);
                Some(self.ctx.stack_height() - 1)
            }
            None => None,
        };

        let code = self.ctx.compiled_contract(name).to_vec();
        let code_length = code.len() as u64;
        let data = self.ctx.append_data(code);

        let size = code_length + self.encoded_arguments_size(Some(params), args);
        reserve_memory(self.ctx, size);
        let base_position = self.ctx.stack_height() - 1;
        self.ctx.push_u64(code_length);
        self.ctx.push_data(data);
        self.ctx.dup_stack_element(base_position, loc)?;
        self.ctx.emit(Instruction::Codecopy);

        let args_length =
            self.append_argument_copy_to_memory(Some(params), args, base_position, code_length)?;
        self.ctx.push_u64(code_length + args_length);
        self.ctx.dup_stack_element(base_position, loc)?;
        match value_position {
            Some(position) => self.ctx.dup_stack_element(position, loc)?,
            None => self.ctx.push_u64(0),
        }
        self.ctx.emit(Instruction::Create);

        // A zero address means the constructor failed.
        self.ctx.emit(Instruction::dup(1));
        append_abort_unless(self.ctx);
        pop_below_top(self.ctx, 1 + value_position.map_or(0, |_| 1));
        Ok(())
    }
}

fn is_memory_dynamic_array(compiler: &ExpressionCompiler, arg: &SpannedBox<Expr>) -> bool {
    matches!(
        compiler.ts().get_kind(compiler.get_type(arg)),
        TypeKind::Array {
            length: None,
            location: DataLocation::Memory,
            ..
        }
    )
}
