//! A small interpreter for generated assembly, enough to check what the
//! emitted code computes.

use alloy_primitives::{keccak256, U256};
use sabre_codegen::assembly::AssemblyItem;
use sabre_codegen::context::CompilerContext;
use sabre_codegen::instruction::Instruction;
use std::collections::HashMap;

/// Code offset given to the first data blob, the next one starts a stride
/// further.
pub const DATA_STRIDE: u64 = 0x10000;
pub const SELF_ADDRESS: u64 = 0x5e1f;
pub const CALLER_ADDRESS: u64 = 0xca11e2;
pub const CREATED_ADDRESS: u64 = 0xc0ffee;
pub const GAS_LEFT: u64 = 1_000_000;
const STEP_LIMIT: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Invalid,
    StackUnderflow,
    BadJump(U256),
    StepLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCall {
    pub gas: U256,
    pub address: U256,
    pub value: U256,
    pub input: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub topics: Vec<U256>,
    pub data: Vec<u8>,
}

type CallHandler<'c> = Box<dyn FnMut(&MessageCall) -> (bool, Vec<u8>) + 'c>;

pub struct Machine<'c> {
    ctx: &'c CompilerContext,
    labels: HashMap<usize, usize>,
    call_handler: CallHandler<'c>,

    pub stack: Vec<U256>,
    pub memory: Vec<u8>,
    pub storage: HashMap<U256, U256>,
    pub balances: HashMap<U256, U256>,
    pub calls: Vec<MessageCall>,
    pub logs: Vec<LogEntry>,
    pub creations: Vec<(U256, Vec<u8>)>,
    pub destroyed: Option<U256>,
}

pub fn word(value: u64) -> U256 {
    U256::from(value)
}

/// Two's complement of `value`.
pub fn signed_word(value: i64) -> U256 {
    let magnitude = U256::from(value.unsigned_abs());
    if value < 0 {
        U256::ZERO.wrapping_sub(magnitude)
    } else {
        magnitude
    }
}

fn bool_word(b: bool) -> U256 {
    if b {
        U256::from(1u8)
    } else {
        U256::ZERO
    }
}

fn to_usize(x: U256) -> usize {
    x.to::<usize>()
}

fn sign_bit() -> U256 {
    U256::from(1u8) << 255
}

fn is_negative(x: U256) -> bool {
    x.bit(255)
}

fn negate(x: U256) -> U256 {
    U256::ZERO.wrapping_sub(x)
}

fn abs(x: U256) -> U256 {
    if is_negative(x) {
        negate(x)
    } else {
        x
    }
}

fn sign_extend(byte: U256, x: U256) -> U256 {
    if byte >= U256::from(31u8) {
        return x;
    }
    let bit = to_usize(byte) * 8 + 7;
    let mask = (U256::from(1u8) << (bit + 1)) - U256::from(1u8);
    if x.bit(bit) {
        x | !mask
    } else {
        x & mask
    }
}

impl<'c> Machine<'c> {
    pub fn new(ctx: &'c CompilerContext) -> Machine<'c> {
        let labels = ctx
            .items()
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                AssemblyItem::Tag(label) => Some((label.get_number(), i)),
                _ => None,
            })
            .collect();
        Machine {
            ctx,
            labels,
            call_handler: Box::new(|_| (true, vec![])),
            stack: vec![],
            memory: vec![],
            storage: HashMap::new(),
            balances: HashMap::new(),
            calls: vec![],
            logs: vec![],
            creations: vec![],
            destroyed: None,
        }
    }

    /// Decides the outcome and the output of every CALL.
    pub fn with_call_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&MessageCall) -> (bool, Vec<u8>) + 'c,
    {
        self.call_handler = Box::new(handler);
        self
    }

    pub fn top(&self) -> U256 {
        match self.stack.last() {
            Some(x) => *x,
            None => panic!("the stack is empty"),
        }
    }

    pub fn sload(&self, key: U256) -> U256 {
        self.storage.get(&key).copied().unwrap_or_default()
    }

    pub fn sstore(&mut self, key: U256, value: U256) {
        self.storage.insert(key, value);
    }

    pub fn mload(&mut self, offset: usize) -> U256 {
        U256::from_be_slice(&self.read_memory(offset, 32))
    }

    pub fn mstore(&mut self, offset: usize, value: U256) {
        self.write_memory(offset, &value.to_be_bytes::<32>());
    }

    fn grow_memory(&mut self, offset: usize, length: usize) {
        if length > 0 && offset + length > self.memory.len() {
            let size = (offset + length).div_ceil(32) * 32;
            self.memory.resize(size, 0);
        }
    }

    pub fn read_memory(&mut self, offset: usize, length: usize) -> Vec<u8> {
        self.grow_memory(offset, length);
        self.memory[offset..offset + length].to_vec()
    }

    fn write_memory(&mut self, offset: usize, bytes: &[u8]) {
        self.grow_memory(offset, bytes.len());
        self.memory[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn pop(&mut self) -> Result<U256, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    fn push(&mut self, x: U256) {
        self.stack.push(x);
    }

    fn jump_target(&self, dest: U256) -> Result<usize, Fault> {
        if dest > U256::from(u32::MAX) {
            return Err(Fault::BadJump(dest));
        }
        self.labels
            .get(&to_usize(dest))
            .copied()
            .ok_or(Fault::BadJump(dest))
    }

    fn code_bytes(&self, offset: U256, length: usize) -> Vec<u8> {
        let offset = to_usize(offset);
        let stride = DATA_STRIDE as usize;
        let index = offset / stride;
        let start = offset % stride;
        let blob: &[u8] = if index == 0 {
            &[]
        } else {
            let data = self.ctx.items().iter().find_map(|item| match item {
                AssemblyItem::PushData(id) if id.get_number() == index - 1 => {
                    Some(self.ctx.data(*id))
                }
                _ => None,
            });
            data.unwrap_or(&[])
        };
        (0..length)
            .map(|i| blob.get(start + i).copied().unwrap_or(0))
            .collect()
    }

    /// Runs from the first item until the code ends or halts.
    pub fn run(&mut self) -> Result<(), Fault> {
        let ctx = self.ctx;
        let items = ctx.items();
        let mut pc = 0;
        let mut steps = 0;
        while pc < items.len() {
            steps += 1;
            if steps > STEP_LIMIT {
                return Err(Fault::StepLimit);
            }
            let item = &items[pc];
            pc += 1;
            match item {
                AssemblyItem::Push(value) => self.push(*value),
                AssemblyItem::PushTag(label) => self.push(word(label.get_number() as u64)),
                AssemblyItem::PushData(id) => {
                    self.push(word(DATA_STRIDE * (id.get_number() as u64 + 1)))
                }
                AssemblyItem::Tag(..) => {}
                AssemblyItem::Operation(ins) => match self.execute(*ins)? {
                    Flow::Next => {}
                    Flow::Jump(dest) => pc = self.jump_target(dest)?,
                    Flow::Halt => return Ok(()),
                },
            }
        }
        Ok(())
    }

    fn execute(&mut self, ins: Instruction) -> Result<Flow, Fault> {
        use Instruction::*;
        match ins {
            Stop | Return => return Ok(Flow::Halt),
            Invalid => return Err(Fault::Invalid),
            Jumpdest => {}
            Add | Mul | Sub | Div | Sdiv | Mod | Smod | Exp | Signextend | Lt | Gt | Slt
            | Sgt | Eq | And | Or | Xor | Byte | Shl | Shr | Sar => {
                let a = self.pop()?;
                let b = self.pop()?;
                let result = binary(ins, a, b);
                self.push(result);
            }
            Iszero => {
                let a = self.pop()?;
                self.push(bool_word(a.is_zero()));
            }
            Not => {
                let a = self.pop()?;
                self.push(!a);
            }
            Sha3 => {
                let offset = to_usize(self.pop()?);
                let length = to_usize(self.pop()?);
                let bytes = self.read_memory(offset, length);
                self.push(U256::from_be_bytes(keccak256(bytes).0));
            }
            Address => self.push(word(SELF_ADDRESS)),
            Balance => {
                let a = self.pop()?;
                let balance = self.balances.get(&a).copied().unwrap_or_default();
                self.push(balance);
            }
            Origin | Caller => self.push(word(CALLER_ADDRESS)),
            Callvalue | Calldatasize | Difficulty => self.push(U256::ZERO),
            Calldataload => {
                self.pop()?;
                self.push(U256::ZERO);
            }
            Calldatacopy => {
                let dest = to_usize(self.pop()?);
                self.pop()?;
                let length = to_usize(self.pop()?);
                self.write_memory(dest, &vec![0; length]);
            }
            Codecopy => {
                let dest = to_usize(self.pop()?);
                let offset = self.pop()?;
                let length = to_usize(self.pop()?);
                let bytes = self.code_bytes(offset, length);
                self.write_memory(dest, &bytes);
            }
            Gasprice => self.push(word(1)),
            Coinbase => self.push(word(0xc0)),
            Timestamp => self.push(word(1_700_000_000)),
            Number => self.push(word(42)),
            Gaslimit => self.push(word(30_000_000)),
            Gas => self.push(word(GAS_LEFT)),
            Pop => {
                self.pop()?;
            }
            Mload => {
                let offset = to_usize(self.pop()?);
                let value = self.mload(offset);
                self.push(value);
            }
            Mstore => {
                let offset = to_usize(self.pop()?);
                let value = self.pop()?;
                self.mstore(offset, value);
            }
            Mstore8 => {
                let offset = to_usize(self.pop()?);
                let value = self.pop()?;
                self.write_memory(offset, &[value.byte(0)]);
            }
            Sload => {
                let key = self.pop()?;
                let value = self.sload(key);
                self.push(value);
            }
            Sstore => {
                let key = self.pop()?;
                let value = self.pop()?;
                self.sstore(key, value);
            }
            Jump => {
                let dest = self.pop()?;
                return Ok(Flow::Jump(dest));
            }
            Jumpi => {
                let dest = self.pop()?;
                let condition = self.pop()?;
                if !condition.is_zero() {
                    return Ok(Flow::Jump(dest));
                }
            }
            Dup(n) => {
                let n = n as usize;
                if n > self.stack.len() {
                    return Err(Fault::StackUnderflow);
                }
                let value = self.stack[self.stack.len() - n];
                self.push(value);
            }
            Swap(n) => {
                let n = n as usize;
                if n >= self.stack.len() {
                    return Err(Fault::StackUnderflow);
                }
                let top = self.stack.len() - 1;
                self.stack.swap(top, top - n);
            }
            Log(n) => {
                let offset = to_usize(self.pop()?);
                let length = to_usize(self.pop()?);
                let mut topics = vec![];
                for _ in 0..n {
                    topics.push(self.pop()?);
                }
                let data = self.read_memory(offset, length);
                self.logs.push(LogEntry { topics, data });
            }
            Create => {
                let value = self.pop()?;
                let offset = to_usize(self.pop()?);
                let length = to_usize(self.pop()?);
                let code = self.read_memory(offset, length);
                self.creations.push((value, code));
                self.push(word(CREATED_ADDRESS));
            }
            Call => {
                let gas = self.pop()?;
                let address = self.pop()?;
                let value = self.pop()?;
                let in_offset = to_usize(self.pop()?);
                let in_length = to_usize(self.pop()?);
                let out_offset = to_usize(self.pop()?);
                let out_length = to_usize(self.pop()?);
                let call = MessageCall {
                    gas,
                    address,
                    value,
                    input: self.read_memory(in_offset, in_length),
                };
                let (success, output) = (self.call_handler)(&call);
                self.calls.push(call);
                let copied = output.len().min(out_length);
                self.write_memory(out_offset, &output[..copied]);
                self.push(bool_word(success));
            }
            Selfdestruct => {
                let beneficiary = self.pop()?;
                self.destroyed = Some(beneficiary);
                return Ok(Flow::Halt);
            }
        }
        Ok(Flow::Next)
    }
}

enum Flow {
    Next,
    Jump(U256),
    Halt,
}

/// `a` is the word that was on top of the stack.
fn binary(ins: Instruction, a: U256, b: U256) -> U256 {
    use Instruction::*;
    match ins {
        Add => a.wrapping_add(b),
        Mul => a.wrapping_mul(b),
        Sub => a.wrapping_sub(b),
        Div => a.checked_div(b).unwrap_or_default(),
        Mod => a.checked_rem(b).unwrap_or_default(),
        Sdiv => {
            if b.is_zero() {
                return U256::ZERO;
            }
            let quotient = abs(a) / abs(b);
            if is_negative(a) != is_negative(b) {
                negate(quotient)
            } else {
                quotient
            }
        }
        Smod => {
            if b.is_zero() {
                return U256::ZERO;
            }
            let remainder = abs(a) % abs(b);
            if is_negative(a) {
                negate(remainder)
            } else {
                remainder
            }
        }
        Exp => a.wrapping_pow(b),
        Signextend => sign_extend(a, b),
        Lt => bool_word(a < b),
        Gt => bool_word(a > b),
        Slt => bool_word((a ^ sign_bit()) < (b ^ sign_bit())),
        Sgt => bool_word((a ^ sign_bit()) > (b ^ sign_bit())),
        Eq => bool_word(a == b),
        And => a & b,
        Or => a | b,
        Xor => a ^ b,
        Byte => {
            if a >= U256::from(32u8) {
                U256::ZERO
            } else {
                U256::from(b.byte(31 - to_usize(a)))
            }
        }
        Shl | Shr | Sar => {
            let overflow = a >= U256::from(256u16);
            match ins {
                Shl if overflow => U256::ZERO,
                Shl => b << to_usize(a),
                Shr if overflow => U256::ZERO,
                Shr => b >> to_usize(a),
                _ if is_negative(b) && overflow => U256::MAX,
                _ if overflow => U256::ZERO,
                _ if is_negative(b) => !((!b) >> to_usize(a)),
                _ => b >> to_usize(a),
            }
        }
        _ => unreachable!("{} is not a binary operation", ins),
    }
}
