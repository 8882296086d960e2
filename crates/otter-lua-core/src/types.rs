//! Target type descriptors for values pulled out of Lua.

use std::fmt;

use crate::value::{LightPointer, Value};

/// Semantic type a Lua stack slot is converted into.
///
/// `Function` and `Variadic` have no conversion; they exist so that
/// host signatures using them can be named in errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    String,
    Bytes,
    Any,
    Pointer,
    Slice(Box<TypeDesc>),
    Map(Box<TypeDesc>, Box<TypeDesc>),
    Function,
    Variadic(Box<TypeDesc>),
}

impl TypeDesc {
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::Isize
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Self::U8 | Self::U16 | Self::U32 | Self::U64 | Self::Usize
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// True if this descriptor, or any nested one, is variadic
    pub fn contains_variadic(&self) -> bool {
        match self {
            Self::Variadic(_) => true,
            Self::Slice(elem) => elem.contains_variadic(),
            Self::Map(key, value) => key.contains_variadic() || value.contains_variadic(),
            _ => false,
        }
    }

    /// Value used when Lua passes `nil` for a parameter of this type
    pub fn zero_value(&self) -> Value {
        match self {
            Self::Bool => Value::Boolean(false),
            t if t.is_signed() || t.is_unsigned() || t.is_float() => Value::Number(0.0),
            Self::String => Value::String(String::new()),
            Self::Bytes => Value::Bytes(Vec::new()),
            Self::Slice(_) | Self::Variadic(_) => Value::Array(Vec::new()),
            Self::Map(..) => Value::Map(Vec::new()),
            Self::Pointer => Value::Pointer(LightPointer::null()),
            _ => Value::Nil,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::I8 => f.write_str("i8"),
            Self::I16 => f.write_str("i16"),
            Self::I32 => f.write_str("i32"),
            Self::I64 => f.write_str("i64"),
            Self::Isize => f.write_str("isize"),
            Self::U8 => f.write_str("u8"),
            Self::U16 => f.write_str("u16"),
            Self::U32 => f.write_str("u32"),
            Self::U64 => f.write_str("u64"),
            Self::Usize => f.write_str("usize"),
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
            Self::String => f.write_str("String"),
            Self::Bytes => f.write_str("Vec<u8>"),
            Self::Any => f.write_str("any"),
            Self::Pointer => f.write_str("pointer"),
            Self::Slice(elem) => write!(f, "Vec<{}>", elem),
            Self::Map(key, value) => write!(f, "Map<{}, {}>", key, value),
            Self::Function => f.write_str("FUNCTION"),
            Self::Variadic(elem) => write!(f, "...{}", elem),
        }
    }
}
