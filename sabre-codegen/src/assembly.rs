use crate::instruction::Instruction;
use alloy_primitives::U256;
use std::fmt;

/// A jump target. Resolved to a code offset by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) usize);

impl Label {
    pub fn get_number(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag_{}", self.0)
    }
}

/// A constant byte blob appended to the code, e.g. the code of a contract
/// created with `new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataId(pub(crate) usize);

impl DataId {
    pub fn get_number(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data_{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyItem {
    Operation(Instruction),
    Push(U256),
    /// Pushes the code offset of a label.
    PushTag(Label),
    /// Binds a label here, emitted as a jump destination.
    Tag(Label),
    /// Pushes the code offset of a data blob.
    PushData(DataId),
}

impl AssemblyItem {
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            AssemblyItem::Operation(ins) => ins.stack_effect(),
            AssemblyItem::Push(..) | AssemblyItem::PushTag(..) | AssemblyItem::PushData(..) => {
                (0, 1)
            }
            AssemblyItem::Tag(..) => (0, 0),
        }
    }
}

impl From<Instruction> for AssemblyItem {
    fn from(ins: Instruction) -> AssemblyItem {
        AssemblyItem::Operation(ins)
    }
}

impl fmt::Display for AssemblyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyItem::Operation(ins) => write!(f, "{}", ins),
            AssemblyItem::Push(value) => write!(f, "PUSH {:#x}", value),
            AssemblyItem::PushTag(label) => write!(f, "PUSH [{}]", label),
            AssemblyItem::Tag(label) => write!(f, "{}:", label),
            AssemblyItem::PushData(data) => write!(f, "PUSH [{}]", data),
        }
    }
}
