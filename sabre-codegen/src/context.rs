use crate::assembly::{AssemblyItem, DataId, Label};
use crate::error::{CodegenError, Result};
use crate::instruction::Instruction;
use crate::options::CodegenOptions;

use alloy_primitives::U256;
use log::trace;
use sabre_frontend::span::SpanLoc;
use sabre_frontend::typesystem::{TypeId, TypeSystem};
use std::collections::HashMap;
use std::fmt;

/// Where a state variable lives. Packed variables share a slot and are told
/// apart by the byte offset of their lowest-order byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLocation {
    pub slot: U256,
    pub byte_offset: u8,
}

pub(crate) struct Checkpoint {
    items: usize,
    data: usize,
    stack_height: usize,
}

/// The code being generated plus everything the code generator needs to know
/// about the surrounding contract: where locals sit on the stack, where state
/// variables are stored and which labels belong to which function.
///
/// The context tracks the height of the machine stack at the current
/// emission point. Every appended item updates it according to its stack
/// effect, so callers only adjust it by hand around jumps whose target
/// leaves a different height.
pub struct CompilerContext {
    items: Vec<AssemblyItem>,
    stack_height: usize,
    next_label: usize,
    data: Vec<Vec<u8>>,

    local_variables: HashMap<String, usize>,
    state_variables: HashMap<String, StorageLocation>,
    function_labels: HashMap<String, Label>,
    compiled_contracts: HashMap<String, Vec<u8>>,

    options: CodegenOptions,
}

impl CompilerContext {
    pub fn new(options: CodegenOptions) -> CompilerContext {
        CompilerContext {
            items: vec![],
            stack_height: 0,
            next_label: 0,
            data: vec![],
            local_variables: HashMap::new(),
            state_variables: HashMap::new(),
            function_labels: HashMap::new(),
            compiled_contracts: HashMap::new(),
            options,
        }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    pub fn items(&self) -> &[AssemblyItem] {
        &self.items
    }

    pub fn code_size(&self) -> usize {
        self.items.len()
    }

    pub fn data(&self, id: DataId) -> &[u8] {
        &self.data[id.0]
    }

    pub fn append(&mut self, item: AssemblyItem) {
        let (args, rets) = item.stack_effect();
        assert!(
            self.stack_height >= args,
            "Stack underflow emitting {}: only {} words available",
            item,
            self.stack_height
        );
        self.stack_height = self.stack_height - args + rets;
        trace!("[{:>3}] {}", self.stack_height, item);
        self.items.push(item);
    }

    pub fn emit(&mut self, ins: Instruction) {
        self.append(AssemblyItem::Operation(ins));
    }

    pub fn push(&mut self, value: U256) {
        self.append(AssemblyItem::Push(value));
    }

    pub fn push_u64(&mut self, value: u64) {
        self.push(U256::from(value));
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    pub fn push_tag(&mut self, label: Label) {
        self.append(AssemblyItem::PushTag(label));
    }

    pub fn push_new_tag(&mut self) -> Label {
        let label = self.new_label();
        self.push_tag(label);
        label
    }

    pub fn bind_label(&mut self, label: Label) {
        self.append(AssemblyItem::Tag(label));
    }

    pub fn append_jump_to(&mut self, label: Label) {
        self.push_tag(label);
        self.emit(Instruction::Jump);
    }

    /// Consumes the condition on top of the stack.
    pub fn append_conditional_jump_to(&mut self, label: Label) {
        self.push_tag(label);
        self.emit(Instruction::Jumpi);
    }

    pub fn append_conditional_jump(&mut self) -> Label {
        let label = self.new_label();
        self.append_conditional_jump_to(label);
        label
    }

    pub fn append_data(&mut self, bytes: Vec<u8>) -> DataId {
        let id = DataId(self.data.len());
        self.data.push(bytes);
        id
    }

    pub fn push_data(&mut self, id: DataId) {
        self.append(AssemblyItem::PushData(id));
    }

    pub fn stack_height(&self) -> usize {
        self.stack_height
    }

    pub fn adjust_stack_height(&mut self, delta: isize) {
        let new_height = self.stack_height as isize + delta;
        assert!(
            new_height >= 0,
            "Stack height adjusted below zero ({} {:+})",
            self.stack_height,
            delta
        );
        self.stack_height = new_height as usize;
    }

    pub fn set_stack_height(&mut self, height: usize) {
        self.stack_height = height;
    }

    /// Registers a local whose first word sits at the current height, i.e.
    /// it is the next value pushed.
    pub fn add_local_variable(&mut self, name: &str) -> usize {
        let base = self.stack_height;
        self.add_local_variable_at(name, base);
        base
    }

    pub fn add_local_variable_at(&mut self, name: &str, base: usize) {
        self.local_variables.insert(name.to_string(), base);
    }

    pub fn local_offset(&self, name: &str) -> usize {
        match self.local_variables.get(name) {
            Some(base) => *base,
            None => panic!("Unknown local variable {}", name),
        }
    }

    /// Zero-based distance from the top of the stack to the word at `base`.
    pub fn base_to_current_stack_offset(&self, base: usize) -> usize {
        assert!(
            base < self.stack_height,
            "Stack position {} is above the stack height {}",
            base,
            self.stack_height
        );
        self.stack_height - base - 1
    }

    /// Copies the word at stack position `base` to the top.
    pub fn dup_stack_element(&mut self, base: usize, loc: SpanLoc) -> Result<()> {
        let depth = self.base_to_current_stack_offset(base) + 1;
        if depth > 16 {
            return Err(CodegenError::StackTooDeep { loc });
        }
        self.emit(Instruction::dup(depth));
        Ok(())
    }

    pub fn add_state_variable(&mut self, name: &str, location: StorageLocation) {
        self.state_variables.insert(name.to_string(), location);
    }

    /// Assigns storage to state variables in declaration order.
    pub fn layout_state_variables(&mut self, ts: &TypeSystem, variables: &[(&str, TypeId)]) {
        let types: Vec<TypeId> = variables.iter().map(|(_, ty)| *ty).collect();
        let (offsets, _) = ts.storage_layout(&types);
        for ((name, _), offset) in variables.iter().zip(offsets) {
            self.add_state_variable(
                name,
                StorageLocation {
                    slot: U256::from(offset.slot),
                    byte_offset: offset.byte_offset,
                },
            );
        }
    }

    pub fn storage_location(&self, name: &str) -> StorageLocation {
        match self.state_variables.get(name) {
            Some(location) => *location,
            None => panic!("Unknown state variable {}", name),
        }
    }

    pub fn function_entry_label(&mut self, name: &str) -> Label {
        if let Some(label) = self.function_labels.get(name) {
            return *label;
        }
        let label = self.new_label();
        self.function_labels.insert(name.to_string(), label);
        label
    }

    pub fn register_compiled_contract(&mut self, name: &str, code: Vec<u8>) {
        self.compiled_contracts.insert(name.to_string(), code);
    }

    pub fn compiled_contract(&self, name: &str) -> &[u8] {
        match self.compiled_contracts.get(name) {
            Some(code) => code,
            None => panic!("Contract {} has not been compiled yet", name),
        }
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            items: self.items.len(),
            data: self.data.len(),
            stack_height: self.stack_height,
        }
    }

    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.items.truncate(checkpoint.items);
        self.data.truncate(checkpoint.data);
        self.stack_height = checkpoint.stack_height;
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        CompilerContext::new(CodegenOptions::default())
    }
}

impl fmt::Display for CompilerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            match item {
                AssemblyItem::Tag(..) => writeln!(f, "{}", item)?,
                _ => writeln!(f, "    {}", item)?,
            }
        }
        Ok(())
    }
}
