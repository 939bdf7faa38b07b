use alloy_primitives::U256;
use std::convert::From;
use std::fmt;

/// Compile time value of a literal. Every constant has a single 256-bit word
/// representation which is what ends up pushed on the machine stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    // Two's complement, already sign extended to 256 bits.
    Integer(U256),
    Bool(bool),
    // Left aligned in the word, at most 32 bytes.
    Bytes(Vec<u8>),
}

impl Constant {
    pub fn word(&self) -> U256 {
        match self {
            Constant::Integer(v) => *v,
            Constant::Bool(b) => {
                if *b {
                    U256::from(1u8)
                } else {
                    U256::ZERO
                }
            }
            Constant::Bytes(bytes) => {
                assert!(
                    bytes.len() <= 32,
                    "byte constant of {} bytes does not fit a word",
                    bytes.len()
                );
                let mut word = [0u8; 32];
                word[..bytes.len()].copy_from_slice(bytes);
                U256::from_be_bytes(word)
            }
        }
    }
}

impl From<u64> for Constant {
    fn from(v: u64) -> Constant {
        Constant::Integer(U256::from(v))
    }
}

impl From<i64> for Constant {
    fn from(v: i64) -> Constant {
        let magnitude = U256::from(v.unsigned_abs());
        if v < 0 {
            Constant::Integer(U256::ZERO.wrapping_sub(magnitude))
        } else {
            Constant::Integer(magnitude)
        }
    }
}

impl From<U256> for Constant {
    fn from(v: U256) -> Constant {
        Constant::Integer(v)
    }
}

impl From<bool> for Constant {
    fn from(v: bool) -> Constant {
        Constant::Bool(v)
    }
}

impl From<&str> for Constant {
    fn from(v: &str) -> Constant {
        Constant::Bytes(v.as_bytes().to_vec())
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Integer(x) => write!(f, "{}", x),
            Constant::Bool(x) => write!(f, "{}", x),
            Constant::Bytes(x) => write!(f, "\"{}\"", String::from_utf8_lossy(x)),
        }
    }
}
