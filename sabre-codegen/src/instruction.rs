use std::fmt;

/// Instructions of the target stack machine. Binary operators take their
/// first operand from the top of the stack: `SUB` computes `top - second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Stop,
    Add,
    Mul,
    Sub,
    Div,
    Sdiv,
    Mod,
    Smod,
    Exp,
    Signextend,
    Lt,
    Gt,
    Slt,
    Sgt,
    Eq,
    Iszero,
    And,
    Or,
    Xor,
    Not,
    Byte,
    Shl,
    Shr,
    Sar,
    Sha3,
    Address,
    Balance,
    Origin,
    Caller,
    Callvalue,
    Calldataload,
    Calldatasize,
    Calldatacopy,
    Codecopy,
    Gasprice,
    Coinbase,
    Timestamp,
    Number,
    Difficulty,
    Gaslimit,
    Pop,
    Mload,
    Mstore,
    Mstore8,
    Sload,
    Sstore,
    Jump,
    Jumpi,
    Gas,
    Jumpdest,
    Dup(u8),
    Swap(u8),
    Log(u8),
    Create,
    Call,
    Return,
    Invalid,
    Selfdestruct,
}

impl Instruction {
    pub fn dup(n: usize) -> Instruction {
        assert!((1..=16).contains(&n), "Invalid DUP{}", n);
        Instruction::Dup(n as u8)
    }

    pub fn swap(n: usize) -> Instruction {
        assert!((1..=16).contains(&n), "Invalid SWAP{}", n);
        Instruction::Swap(n as u8)
    }

    pub fn log(topics: usize) -> Instruction {
        assert!(topics <= 4, "Invalid LOG{}", topics);
        Instruction::Log(topics as u8)
    }

    /// Number of words consumed and produced.
    pub fn stack_effect(&self) -> (usize, usize) {
        use Instruction::*;
        match self {
            Stop | Jumpdest | Invalid => (0, 0),
            Address | Origin | Caller | Callvalue | Calldatasize | Gasprice | Coinbase
            | Timestamp | Number | Difficulty | Gaslimit | Gas => (0, 1),
            Iszero | Not | Balance | Calldataload | Mload | Sload => (1, 1),
            Pop | Jump | Selfdestruct => (1, 0),
            Add | Mul | Sub | Div | Sdiv | Mod | Smod | Exp | Signextend | Lt | Gt | Slt
            | Sgt | Eq | And | Or | Xor | Byte | Shl | Shr | Sar | Sha3 => (2, 1),
            Mstore | Mstore8 | Sstore | Jumpi | Return => (2, 0),
            Calldatacopy | Codecopy => (3, 0),
            Create => (3, 1),
            Call => (7, 1),
            Dup(n) => (*n as usize, *n as usize + 1),
            Swap(n) => (*n as usize + 1, *n as usize + 1),
            Log(n) => (*n as usize + 2, 0),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        let name = match self {
            Dup(n) => return write!(f, "DUP{}", n),
            Swap(n) => return write!(f, "SWAP{}", n),
            Log(n) => return write!(f, "LOG{}", n),
            Stop => "STOP",
            Add => "ADD",
            Mul => "MUL",
            Sub => "SUB",
            Div => "DIV",
            Sdiv => "SDIV",
            Mod => "MOD",
            Smod => "SMOD",
            Exp => "EXP",
            Signextend => "SIGNEXTEND",
            Lt => "LT",
            Gt => "GT",
            Slt => "SLT",
            Sgt => "SGT",
            Eq => "EQ",
            Iszero => "ISZERO",
            And => "AND",
            Or => "OR",
            Xor => "XOR",
            Not => "NOT",
            Byte => "BYTE",
            Shl => "SHL",
            Shr => "SHR",
            Sar => "SAR",
            Sha3 => "SHA3",
            Address => "ADDRESS",
            Balance => "BALANCE",
            Origin => "ORIGIN",
            Caller => "CALLER",
            Callvalue => "CALLVALUE",
            Calldataload => "CALLDATALOAD",
            Calldatasize => "CALLDATASIZE",
            Calldatacopy => "CALLDATACOPY",
            Codecopy => "CODECOPY",
            Gasprice => "GASPRICE",
            Coinbase => "COINBASE",
            Timestamp => "TIMESTAMP",
            Number => "NUMBER",
            Difficulty => "DIFFICULTY",
            Gaslimit => "GASLIMIT",
            Pop => "POP",
            Mload => "MLOAD",
            Mstore => "MSTORE",
            Mstore8 => "MSTORE8",
            Sload => "SLOAD",
            Sstore => "SSTORE",
            Jump => "JUMP",
            Jumpi => "JUMPI",
            Gas => "GAS",
            Jumpdest => "JUMPDEST",
            Create => "CREATE",
            Call => "CALL",
            Return => "RETURN",
            Invalid => "INVALID",
            Selfdestruct => "SELFDESTRUCT",
        };
        write!(f, "{}", name)
    }
}
