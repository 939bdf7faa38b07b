use crate::utils;
use std::collections::HashMap;

use alloy_primitives::U256;

#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, Ord, PartialOrd)]
pub struct TypeId(utils::Identifier);

impl Default for TypeId {
    fn default() -> TypeId {
        TypeId(utils::new_id())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DataLocation {
    Storage,
    Memory,
}

/// The implicit objects `msg`, `block` and `tx`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MagicKind {
    Message,
    Block,
    Transaction,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum FunctionKind {
    /// Jump into code of the same contract.
    Internal,
    /// Message call to another contract, `selector` selects the callee.
    External { selector: u32 },
    /// `address.call(...)`, no selector and no return data.
    Bare,
    /// `address.send(value)`.
    Send,
    /// `new C(...)`.
    Creation,
    /// `new T[](n)` for memory arrays.
    ArrayAllocation,
    Sha3,
    Log(u8),
    /// `topic` is the hash of the event signature.
    Event { topic: U256, indexed: Vec<bool> },
    /// Precompiled contract living at a fixed low address.
    Precompile(u8),
    Selfdestruct,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct FunctionType {
    pub params: Vec<TypeId>,
    pub returns: Vec<TypeId>,
    pub kind: FunctionKind,
}

impl FunctionType {
    pub fn new(params: Vec<TypeId>, returns: Vec<TypeId>, kind: FunctionKind) -> FunctionType {
        FunctionType {
            params,
            returns,
            kind,
        }
    }
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Hash)]
pub enum TypeKind {
    #[default]
    Void,
    Integer {
        bits: u16,
        signed: bool,
    },
    Address,
    Bool,
    FixedBytes(u8),
    Contract(String),
    Mapping {
        key: TypeId,
        value: TypeId,
    },
    Array {
        element: TypeId,
        length: Option<u64>,
        location: DataLocation,
    },
    Struct {
        name: String,
        members: Vec<(String, TypeId)>,
        location: DataLocation,
    },
    Function(FunctionType),
    // A type used in expression position, e.g. the callee of `uint8(x)`.
    TypeType(TypeId),
    Magic(MagicKind),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct StorageOffset {
    pub slot: u64,
    pub byte_offset: u8,
}

#[derive(Debug, Clone, Copy)]
enum MagicMemberType {
    Address,
    Uint256,
}

lazy_static! {
    static ref MAGIC_MEMBERS: HashMap<(MagicKind, &'static str), MagicMemberType> = {
        let mut m = HashMap::new();
        m.insert((MagicKind::Message, "sender"), MagicMemberType::Address);
        m.insert((MagicKind::Message, "value"), MagicMemberType::Uint256);
        m.insert((MagicKind::Message, "gas"), MagicMemberType::Uint256);
        m.insert((MagicKind::Transaction, "origin"), MagicMemberType::Address);
        m.insert((MagicKind::Transaction, "gasprice"), MagicMemberType::Uint256);
        m.insert((MagicKind::Block, "coinbase"), MagicMemberType::Address);
        m.insert((MagicKind::Block, "timestamp"), MagicMemberType::Uint256);
        m.insert((MagicKind::Block, "number"), MagicMemberType::Uint256);
        m.insert((MagicKind::Block, "difficulty"), MagicMemberType::Uint256);
        m.insert((MagicKind::Block, "gaslimit"), MagicMemberType::Uint256);
        m
    };
}

#[derive(Debug, Default)]
pub struct Type {
    id: TypeId,
    kind: TypeKind,
}

impl Type {
    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn get_kind(&self) -> &TypeKind {
        &self.kind
    }
}

// TypeSystem

/// Owner of every type of a compilation. Types are structural: asking twice
/// for the same kind yields the same TypeId.
pub struct TypeSystem {
    types: HashMap<TypeId, Type>,
    derived_types: HashMap<TypeKind, TypeId>,

    void_type_id: TypeId,
    bool_type_id: TypeId,
    address_type_id: TypeId,
}

impl TypeSystem {
    pub fn new() -> TypeSystem {
        let mut ts = TypeSystem {
            types: HashMap::new(),
            derived_types: HashMap::new(),
            void_type_id: TypeId::default(),
            bool_type_id: TypeId::default(),
            address_type_id: TypeId::default(),
        };
        ts.void_type_id = ts.intern(TypeKind::Void);
        ts.bool_type_id = ts.intern(TypeKind::Bool);
        ts.address_type_id = ts.intern(TypeKind::Address);
        ts
    }

    fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(id) = self.derived_types.get(&kind) {
            return *id;
        }
        let ty = Type {
            id: TypeId::default(),
            kind: kind.clone(),
        };
        let new_id = ty.id();
        self.types.insert(new_id, ty);
        self.derived_types.insert(kind, new_id);
        new_id
    }

    fn get_type_internal(&self, id: TypeId) -> &Type {
        match self.types.get(&id) {
            Some(ty) => ty,
            None => panic!("Unknown type {:?}", id),
        }
    }

    pub fn get_kind(&self, ty: TypeId) -> &TypeKind {
        self.get_type_internal(ty).get_kind()
    }

    pub fn get_void_type(&self) -> TypeId {
        self.void_type_id
    }

    pub fn get_bool_type(&self) -> TypeId {
        self.bool_type_id
    }

    pub fn get_address_type(&self) -> TypeId {
        self.address_type_id
    }

    pub fn get_integer_type(&mut self, bits: u16, signed: bool) -> TypeId {
        assert!(
            bits >= 8 && bits <= 256 && bits % 8 == 0,
            "Invalid integer width {}",
            bits
        );
        self.intern(TypeKind::Integer { bits, signed })
    }

    pub fn get_uint256_type(&mut self) -> TypeId {
        self.get_integer_type(256, false)
    }

    pub fn get_fixed_bytes_type(&mut self, size: u8) -> TypeId {
        assert!(size >= 1 && size <= 32, "Invalid fixed bytes size {}", size);
        self.intern(TypeKind::FixedBytes(size))
    }

    pub fn get_contract_type(&mut self, name: &str) -> TypeId {
        self.intern(TypeKind::Contract(name.to_string()))
    }

    pub fn get_mapping_type(&mut self, key: TypeId, value: TypeId) -> TypeId {
        assert!(self.is_value_type(key), "Mapping keys must be value types");
        self.intern(TypeKind::Mapping { key, value })
    }

    pub fn get_array_type(
        &mut self,
        element: TypeId,
        length: Option<u64>,
        location: DataLocation,
    ) -> TypeId {
        // Storage arrays are laid out statically.
        assert!(
            length.is_some() || location == DataLocation::Memory,
            "Dynamically-sized storage arrays are not supported"
        );
        self.intern(TypeKind::Array {
            element,
            length,
            location,
        })
    }

    pub fn get_struct_type(
        &mut self,
        name: &str,
        members: Vec<(String, TypeId)>,
        location: DataLocation,
    ) -> TypeId {
        self.intern(TypeKind::Struct {
            name: name.to_string(),
            members,
            location,
        })
    }

    pub fn get_function_type(&mut self, function_type: FunctionType) -> TypeId {
        self.intern(TypeKind::Function(function_type))
    }

    pub fn get_type_type(&mut self, ty: TypeId) -> TypeId {
        self.intern(TypeKind::TypeType(ty))
    }

    pub fn get_magic_type(&mut self, kind: MagicKind) -> TypeId {
        self.intern(TypeKind::Magic(kind))
    }

    /// Type of `msg.sender`, `block.number` and friends.
    pub fn get_magic_member_type(&mut self, kind: MagicKind, member: &str) -> Option<TypeId> {
        match MAGIC_MEMBERS.get(&(kind, member))? {
            MagicMemberType::Address => Some(self.get_address_type()),
            MagicMemberType::Uint256 => Some(self.get_uint256_type()),
        }
    }

    pub fn is_fixed_bytes_type(&self, ty: TypeId) -> bool {
        matches!(self.get_kind(ty), TypeKind::FixedBytes(..))
    }

    pub fn is_mapping_type(&self, ty: TypeId) -> bool {
        matches!(self.get_kind(ty), TypeKind::Mapping { .. })
    }

    pub fn is_struct_type(&self, ty: TypeId) -> bool {
        matches!(self.get_kind(ty), TypeKind::Struct { .. })
    }

    pub fn is_function_type(&self, ty: TypeId) -> bool {
        matches!(self.get_kind(ty), TypeKind::Function(..))
    }

    /// Integers and everything represented as an unsigned 160-bit integer.
    pub fn is_integer_like_type(&self, ty: TypeId) -> bool {
        matches!(
            self.get_kind(ty),
            TypeKind::Integer { .. } | TypeKind::Address | TypeKind::Contract(..)
        )
    }

    /// Types whose whole value fits in a single stack word.
    pub fn is_value_type(&self, ty: TypeId) -> bool {
        matches!(
            self.get_kind(ty),
            TypeKind::Integer { .. }
                | TypeKind::Address
                | TypeKind::Bool
                | TypeKind::FixedBytes(..)
                | TypeKind::Contract(..)
        )
    }

    pub fn is_reference_type(&self, ty: TypeId) -> bool {
        matches!(
            self.get_kind(ty),
            TypeKind::Mapping { .. } | TypeKind::Array { .. } | TypeKind::Struct { .. }
        )
    }

    pub fn is_signed(&self, ty: TypeId) -> bool {
        match self.get_kind(ty) {
            TypeKind::Integer { signed, .. } => *signed,
            _ => false,
        }
    }

    pub fn num_bits(&self, ty: TypeId) -> u16 {
        match self.get_kind(ty) {
            TypeKind::Integer { bits, .. } => *bits,
            TypeKind::Address | TypeKind::Contract(..) => 160,
            TypeKind::Bool => 8,
            TypeKind::FixedBytes(n) => *n as u16 * 8,
            _ => panic!("Type {} has no bit width", self.type_name(ty)),
        }
    }

    pub fn data_location(&self, ty: TypeId) -> Option<DataLocation> {
        match self.get_kind(ty) {
            TypeKind::Mapping { .. } => Some(DataLocation::Storage),
            TypeKind::Array { location, .. } | TypeKind::Struct { location, .. } => {
                Some(*location)
            }
            _ => None,
        }
    }

    pub fn struct_members(&self, ty: TypeId) -> &[(String, TypeId)] {
        match self.get_kind(ty) {
            TypeKind::Struct { members, .. } => members,
            _ => panic!("This is not a struct type"),
        }
    }

    fn struct_member_index(&self, ty: TypeId, member: &str) -> usize {
        match self
            .struct_members(ty)
            .iter()
            .position(|(name, _)| name == member)
        {
            Some(idx) => idx,
            None => panic!("Struct {} has no member {}", self.type_name(ty), member),
        }
    }

    pub fn struct_member_type(&self, ty: TypeId, member: &str) -> TypeId {
        self.struct_members(ty)[self.struct_member_index(ty, member)].1
    }

    pub fn struct_member_storage_offset(&self, ty: TypeId, member: &str) -> StorageOffset {
        let member_types: Vec<TypeId> = self.struct_members(ty).iter().map(|m| m.1).collect();
        let (offsets, _) = self.storage_layout(&member_types);
        offsets[self.struct_member_index(ty, member)]
    }

    /// Every member of a memory struct takes one word.
    pub fn struct_member_memory_offset(&self, ty: TypeId, member: &str) -> u64 {
        self.struct_member_index(ty, member) as u64 * 32
    }

    pub fn function_type(&self, ty: TypeId) -> &FunctionType {
        match self.get_kind(ty) {
            TypeKind::Function(f) => f,
            _ => panic!("This is not a function type"),
        }
    }

    /// Number of stack words a value of this type occupies.
    pub fn stack_size(&self, ty: TypeId) -> usize {
        match self.get_kind(ty) {
            TypeKind::Void | TypeKind::TypeType(..) | TypeKind::Magic(..) => 0,
            TypeKind::Integer { .. }
            | TypeKind::Address
            | TypeKind::Bool
            | TypeKind::FixedBytes(..)
            | TypeKind::Contract(..) => 1,
            // References: the storage slot or the memory address.
            TypeKind::Mapping { .. } | TypeKind::Array { .. } | TypeKind::Struct { .. } => 1,
            TypeKind::Function(f) => match f.kind {
                FunctionKind::Internal => 1,
                FunctionKind::External { .. } => 2,
                FunctionKind::Bare | FunctionKind::Send => 1,
                FunctionKind::Creation
                | FunctionKind::ArrayAllocation
                | FunctionKind::Sha3
                | FunctionKind::Log(..)
                | FunctionKind::Event { .. }
                | FunctionKind::Precompile(..)
                | FunctionKind::Selfdestruct => 0,
            },
        }
    }

    /// Bytes taken inside a storage slot. Only value types are packed.
    pub fn storage_bytes(&self, ty: TypeId) -> u8 {
        match self.get_kind(ty) {
            TypeKind::Integer { bits, .. } => (*bits / 8) as u8,
            TypeKind::Address | TypeKind::Contract(..) => 20,
            TypeKind::Bool => 1,
            TypeKind::FixedBytes(n) => *n,
            _ => 32,
        }
    }

    pub fn storage_slots(&self, ty: TypeId) -> u64 {
        match self.get_kind(ty) {
            TypeKind::Array {
                element,
                length: Some(length),
                location: DataLocation::Storage,
            } => self.storage_slots(*element) * length,
            TypeKind::Struct { members, .. } => {
                let member_types: Vec<TypeId> = members.iter().map(|m| m.1).collect();
                self.storage_layout(&member_types).1
            }
            TypeKind::Function(..) | TypeKind::TypeType(..) | TypeKind::Magic(..) => {
                panic!("Type {} cannot be stored", self.type_name(ty))
            }
            TypeKind::Array { .. } => panic!(
                "Type {} has no static storage size",
                self.type_name(ty)
            ),
            _ => 1,
        }
    }

    /// Assigns consecutive storage positions to a sequence of types. Value
    /// types are packed into the current slot while they fit; reference types
    /// always occupy whole slots. Returns the offsets and the number of slots
    /// used.
    pub fn storage_layout(&self, types: &[TypeId]) -> (Vec<StorageOffset>, u64) {
        let mut offsets = Vec::with_capacity(types.len());
        let mut slot = 0u64;
        let mut byte_offset = 0u8;

        for ty in types {
            if self.is_value_type(*ty) {
                let size = self.storage_bytes(*ty);
                if byte_offset as u16 + size as u16 > 32 {
                    slot += 1;
                    byte_offset = 0;
                }
                offsets.push(StorageOffset { slot, byte_offset });
                byte_offset += size;
                if byte_offset == 32 {
                    slot += 1;
                    byte_offset = 0;
                }
            } else {
                if byte_offset > 0 {
                    slot += 1;
                    byte_offset = 0;
                }
                offsets.push(StorageOffset {
                    slot,
                    byte_offset: 0,
                });
                slot += self.storage_slots(*ty);
            }
        }

        if byte_offset > 0 {
            slot += 1;
        }
        (offsets, slot)
    }

    /// Size in bytes of the static memory object. None for dynamically-sized
    /// arrays.
    pub fn memory_size(&self, ty: TypeId) -> Option<u64> {
        match self.get_kind(ty) {
            TypeKind::Array {
                length: Some(length),
                ..
            } => Some(length * 32),
            TypeKind::Array { length: None, .. } => None,
            TypeKind::Struct { members, .. } => Some(members.len() as u64 * 32),
            _ => Some(32),
        }
    }

    /// Size of the ABI encoding, None if the type is dynamically sized or has
    /// no encoding at all.
    pub fn abi_encoded_size(&self, ty: TypeId) -> Option<u64> {
        match self.get_kind(ty) {
            TypeKind::Integer { .. }
            | TypeKind::Address
            | TypeKind::Bool
            | TypeKind::FixedBytes(..)
            | TypeKind::Contract(..) => Some(32),
            TypeKind::Array {
                element,
                length: Some(length),
                ..
            } => self.abi_encoded_size(*element).map(|s| s * length),
            TypeKind::Struct { members, .. } => members
                .iter()
                .map(|(_, m)| self.abi_encoded_size(*m))
                .sum(),
            _ => None,
        }
    }

    pub fn is_implicitly_convertible(&self, from: TypeId, to: TypeId) -> bool {
        if from == to {
            return true;
        }
        match (self.get_kind(from), self.get_kind(to)) {
            (
                TypeKind::Integer {
                    bits: from_bits,
                    signed: from_signed,
                },
                TypeKind::Integer {
                    bits: to_bits,
                    signed: to_signed,
                },
            ) => {
                if from_signed == to_signed {
                    to_bits >= from_bits
                } else {
                    // Only unsigned into strictly wider signed.
                    !from_signed && to_bits > from_bits
                }
            }
            (TypeKind::Integer { bits, signed }, TypeKind::Address) => !signed && *bits <= 160,
            (TypeKind::Contract(..), TypeKind::Address) => true,
            (TypeKind::FixedBytes(n), TypeKind::FixedBytes(m)) => m >= n,
            _ => false,
        }
    }

    pub fn is_explicitly_convertible(&self, from: TypeId, to: TypeId) -> bool {
        if self.is_implicitly_convertible(from, to) {
            return true;
        }
        match (self.get_kind(from), self.get_kind(to)) {
            (TypeKind::FixedBytes(..), TypeKind::FixedBytes(..)) => true,
            (TypeKind::FixedBytes(n), TypeKind::Integer { bits, .. })
            | (TypeKind::Integer { bits, .. }, TypeKind::FixedBytes(n)) => *n as u16 * 8 == *bits,
            _ => self.is_integer_like_type(from) && self.is_integer_like_type(to),
        }
    }

    pub fn type_name(&self, ty: TypeId) -> String {
        match self.get_kind(ty) {
            TypeKind::Void => "void".to_string(),
            TypeKind::Integer { bits, signed } => {
                format!("{}{}", if *signed { "int" } else { "uint" }, bits)
            }
            TypeKind::Address => "address".to_string(),
            TypeKind::Bool => "bool".to_string(),
            TypeKind::FixedBytes(n) => format!("bytes{}", n),
            TypeKind::Contract(name) => format!("contract {}", name),
            TypeKind::Mapping { key, value } => format!(
                "mapping({} => {})",
                self.type_name(*key),
                self.type_name(*value)
            ),
            TypeKind::Array {
                element,
                length,
                location,
            } => format!(
                "{}[{}] {}",
                self.type_name(*element),
                length.map(|l| l.to_string()).unwrap_or_default(),
                location_name(*location)
            ),
            TypeKind::Struct { name, location, .. } => {
                format!("struct {} {}", name, location_name(*location))
            }
            TypeKind::Function(f) => {
                let names = |types: &[TypeId]| {
                    types
                        .iter()
                        .map(|t| self.type_name(*t))
                        .collect::<Vec<_>>()
                        .join(",")
                };
                if f.returns.is_empty() {
                    format!("function ({})", names(&f.params))
                } else {
                    format!(
                        "function ({}) returns ({})",
                        names(&f.params),
                        names(&f.returns)
                    )
                }
            }
            TypeKind::TypeType(target) => format!("type({})", self.type_name(*target)),
            TypeKind::Magic(MagicKind::Message) => "msg".to_string(),
            TypeKind::Magic(MagicKind::Block) => "block".to_string(),
            TypeKind::Magic(MagicKind::Transaction) => "tx".to_string(),
        }
    }
}

fn location_name(location: DataLocation) -> &'static str {
    match location {
        DataLocation::Storage => "storage",
        DataLocation::Memory => "memory",
    }
}
