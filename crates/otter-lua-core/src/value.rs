//! Host-side representation of values crossing the Lua boundary.

use std::ffi::c_void;
use std::fmt;

use crate::error::{LuaError, LuaResult};
use crate::function::HostFunction;

/// An opaque address passed to Lua as light userdata.
///
/// The bridge never dereferences it; the host owns whatever it points at.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightPointer(*mut c_void);

// SAFETY: LightPointer is an address only. It is never dereferenced by this
// crate, so moving it between threads cannot cause a data race here.
unsafe impl Send for LightPointer {}
unsafe impl Sync for LightPointer {}

impl LightPointer {
    pub fn new<T>(ptr: *mut T) -> Self {
        Self(ptr.cast())
    }

    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }

    pub fn cast<T>(&self) -> *mut T {
        self.0.cast()
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl fmt::Debug for LightPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LightPointer({:#x})", self.0 as usize)
    }
}

/// A value in the marshaled vocabulary shared by host and script.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
    /// Raw byte string; pushed to Lua as a string
    Bytes(Vec<u8>),
    /// Ordered sequence; becomes a table keyed `1..=n`
    Array(Vec<Value>),
    /// Key/value pairs in table iteration order
    Map(Vec<(Value, Value)>),
    Pointer(LightPointer),
    Function(HostFunction),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Pointer(a), Self::Pointer(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<LightPointer> {
        match self {
            Self::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    /// Look up a map entry by string key
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Lua type name this value is pushed as
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) | Self::Bytes(_) => "string",
            Self::Array(_) | Self::Map(_) => "table",
            Self::Pointer(_) => "userdata",
            Self::Function(_) => "function",
        }
    }

    /// Check that the whole value tree can be pushed.
    ///
    /// Runs before any namespace mutation so a rejected value leaves the
    /// global environment untouched.
    pub fn validate(&self) -> LuaResult<()> {
        match self {
            Self::Array(items) => items.iter().try_for_each(Value::validate),
            Self::Map(entries) => entries.iter().try_for_each(|(key, value)| {
                match key {
                    Self::Nil => return Err(LuaError::unsupported("nil as table key")),
                    Self::Number(n) if n.is_nan() => {
                        return Err(LuaError::unsupported("NaN as table key"));
                    }
                    _ => {}
                }
                key.validate()?;
                value.validate()
            }),
            Self::Function(function) => {
                if function.is_variadic() {
                    Err(LuaError::unsupported(format!(
                        "variadic function {}",
                        function.signature()
                    )))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Convert to JSON.
    ///
    /// Map keys must be strings or numbers. Pointers and functions have no
    /// JSON form.
    pub fn to_json(&self) -> LuaResult<serde_json::Value> {
        use serde_json::Value as Json;

        Ok(match self {
            Self::Nil => Json::Null,
            Self::Boolean(b) => Json::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => Json::String(s.clone()),
            Self::Bytes(bytes) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
            Self::Array(items) => Json::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<LuaResult<Vec<_>>>()?,
            ),
            Self::Map(entries) => {
                let mut object = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = match key {
                        Self::String(s) => s.clone(),
                        Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
                        Self::Number(n) => format_number(*n),
                        other => {
                            return Err(LuaError::unsupported(format!(
                                "{} as JSON object key",
                                other.type_name()
                            )));
                        }
                    };
                    object.insert(key, value.to_json()?);
                }
                Json::Object(object)
            }
            Self::Pointer(_) | Self::Function(_) => {
                return Err(LuaError::unsupported(format!(
                    "{} in JSON",
                    self.type_name()
                )));
            }
        })
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::Nil,
            Json::Bool(b) => Self::Boolean(b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or_default()),
            Json::String(s) => Self::String(s),
            Json::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
            Json::Object(object) => Self::Map(
                object
                    .into_iter()
                    .map(|(k, v)| (Self::String(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}
