//! Conversions between Rust types and [`Value`].
//!
//! [`IntoLua`] projects a host value onto the marshaled vocabulary.
//! [`FromLua`] goes the other way and also names the [`TypeDesc`] a value
//! must be pulled as, so a host function signature fully determines how
//! its arguments are read off the Lua stack.

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

use crate::error::{ConversionKind, LuaError, LuaResult};
use crate::function::HostFunction;
use crate::types::TypeDesc;
use crate::value::{LightPointer, Value};

/// Conversion of a host value into a [`Value`]
pub trait IntoLua {
    fn into_lua(self) -> LuaResult<Value>;
}

/// Conversion of a pulled [`Value`] into a host value
pub trait FromLua: Sized {
    /// Target descriptor used when pulling this type from the stack
    fn type_desc() -> TypeDesc;

    fn from_lua(value: Value) -> LuaResult<Self>;
}

fn mismatch(kind: ConversionKind, value: &Value) -> LuaError {
    LuaError::conversion(kind, value.type_name())
}

impl IntoLua for Value {
    fn into_lua(self) -> LuaResult<Value> {
        Ok(self)
    }
}

impl FromLua for Value {
    fn type_desc() -> TypeDesc {
        TypeDesc::Any
    }

    fn from_lua(value: Value) -> LuaResult<Self> {
        Ok(value)
    }
}

impl IntoLua for bool {
    fn into_lua(self) -> LuaResult<Value> {
        Ok(Value::Boolean(self))
    }
}

impl FromLua for bool {
    fn type_desc() -> TypeDesc {
        TypeDesc::Bool
    }

    fn from_lua(value: Value) -> LuaResult<Self> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(mismatch(ConversionKind::Boolean, &other)),
        }
    }
}

macro_rules! impl_number {
    ($($ty:ty => $desc:ident, $kind:ident;)*) => {
        $(
            impl IntoLua for $ty {
                fn into_lua(self) -> LuaResult<Value> {
                    Ok(Value::Number(self as f64))
                }
            }

            impl FromLua for $ty {
                fn type_desc() -> TypeDesc {
                    TypeDesc::$desc
                }

                fn from_lua(value: Value) -> LuaResult<Self> {
                    match value {
                        Value::Number(n) => Ok(n as $ty),
                        other => Err(mismatch(ConversionKind::$kind, &other)),
                    }
                }
            }
        )*
    };
}

impl_number! {
    i8 => I8, Integer;
    i16 => I16, Integer;
    i32 => I32, Integer;
    i64 => I64, Integer;
    isize => Isize, Integer;
    u8 => U8, Unsigned;
    u16 => U16, Unsigned;
    u32 => U32, Unsigned;
    u64 => U64, Unsigned;
    usize => Usize, Unsigned;
    f32 => F32, Float;
    f64 => F64, Float;
}

impl IntoLua for String {
    fn into_lua(self) -> LuaResult<Value> {
        Ok(Value::String(self))
    }
}

impl IntoLua for &str {
    fn into_lua(self) -> LuaResult<Value> {
        Ok(Value::String(self.to_string()))
    }
}

impl IntoLua for &String {
    fn into_lua(self) -> LuaResult<Value> {
        Ok(Value::String(self.clone()))
    }
}

impl FromLua for String {
    fn type_desc() -> TypeDesc {
        TypeDesc::String
    }

    fn from_lua(value: Value) -> LuaResult<Self> {
        match value {
            Value::String(s) => Ok(s),
            Value::Bytes(b) => Ok(String::from_utf8_lossy(&b).into_owned()),
            other => Err(mismatch(ConversionKind::String, &other)),
        }
    }
}

impl<T: IntoLua> IntoLua for Option<T> {
    fn into_lua(self) -> LuaResult<Value> {
        match self {
            Some(value) => value.into_lua(),
            None => Ok(Value::Nil),
        }
    }
}

impl<T: IntoLua> IntoLua for Vec<T> {
    fn into_lua(self) -> LuaResult<Value> {
        self.into_iter()
            .map(IntoLua::into_lua)
            .collect::<LuaResult<Vec<_>>>()
            .map(Value::Array)
    }
}

impl<T: IntoLua + Clone> IntoLua for &[T] {
    fn into_lua(self) -> LuaResult<Value> {
        self.to_vec().into_lua()
    }
}

impl<T: IntoLua, const N: usize> IntoLua for [T; N] {
    fn into_lua(self) -> LuaResult<Value> {
        Vec::from(self).into_lua()
    }
}

/// `Vec<u8>` pulls as a byte sequence (a Lua string or a table of
/// numbers); every other element type pulls as a slice.
impl<T: FromLua> FromLua for Vec<T> {
    fn type_desc() -> TypeDesc {
        match T::type_desc() {
            TypeDesc::U8 => TypeDesc::Bytes,
            elem => TypeDesc::Slice(Box::new(elem)),
        }
    }

    fn from_lua(value: Value) -> LuaResult<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_lua).collect(),
            Value::Bytes(bytes) => bytes
                .into_iter()
                .map(|b| T::from_lua(Value::Number(f64::from(b))))
                .collect(),
            Value::String(s) => s
                .into_bytes()
                .into_iter()
                .map(|b| T::from_lua(Value::Number(f64::from(b))))
                .collect(),
            other => Err(mismatch(ConversionKind::Slice, &other)),
        }
    }
}

impl<K: IntoLua, V: IntoLua, S> IntoLua for HashMap<K, V, S> {
    fn into_lua(self) -> LuaResult<Value> {
        map_into_lua(self)
    }
}

impl<K: IntoLua, V: IntoLua> IntoLua for BTreeMap<K, V> {
    fn into_lua(self) -> LuaResult<Value> {
        map_into_lua(self)
    }
}

fn map_into_lua<K: IntoLua, V: IntoLua>(
    entries: impl IntoIterator<Item = (K, V)>,
) -> LuaResult<Value> {
    entries
        .into_iter()
        .map(|(k, v)| Ok((k.into_lua()?, v.into_lua()?)))
        .collect::<LuaResult<Vec<_>>>()
        .map(Value::Map)
}

impl<K, V, S> FromLua for HashMap<K, V, S>
where
    K: FromLua + Eq + Hash,
    V: FromLua,
    S: BuildHasher + Default,
{
    fn type_desc() -> TypeDesc {
        TypeDesc::Map(Box::new(K::type_desc()), Box::new(V::type_desc()))
    }

    fn from_lua(value: Value) -> LuaResult<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_lua(k)?, V::from_lua(v)?)))
                .collect(),
            other => Err(mismatch(ConversionKind::Map, &other)),
        }
    }
}

impl<K: FromLua + Ord, V: FromLua> FromLua for BTreeMap<K, V> {
    fn type_desc() -> TypeDesc {
        TypeDesc::Map(Box::new(K::type_desc()), Box::new(V::type_desc()))
    }

    fn from_lua(value: Value) -> LuaResult<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_lua(k)?, V::from_lua(v)?)))
                .collect(),
            other => Err(mismatch(ConversionKind::Map, &other)),
        }
    }
}

impl IntoLua for LightPointer {
    fn into_lua(self) -> LuaResult<Value> {
        Ok(Value::Pointer(self))
    }
}

impl FromLua for LightPointer {
    fn type_desc() -> TypeDesc {
        TypeDesc::Pointer
    }

    fn from_lua(value: Value) -> LuaResult<Self> {
        match value {
            Value::Pointer(p) => Ok(p),
            other => Err(mismatch(ConversionKind::Pointer, &other)),
        }
    }
}

impl<T> IntoLua for *mut T {
    fn into_lua(self) -> LuaResult<Value> {
        Ok(Value::Pointer(LightPointer::new(self)))
    }
}

impl<T> IntoLua for *const T {
    fn into_lua(self) -> LuaResult<Value> {
        Ok(Value::Pointer(LightPointer::new(self.cast_mut())))
    }
}

impl IntoLua for HostFunction {
    fn into_lua(self) -> LuaResult<Value> {
        Ok(Value::Function(self))
    }
}

/// Lua function values cannot be pulled into the host.
impl FromLua for HostFunction {
    fn type_desc() -> TypeDesc {
        TypeDesc::Function
    }

    fn from_lua(_value: Value) -> LuaResult<Self> {
        Err(LuaError::unsupported(TypeDesc::Function.to_string()))
    }
}

impl IntoLua for serde_json::Value {
    fn into_lua(self) -> LuaResult<Value> {
        Ok(Value::from(self))
    }
}

/// Trailing "rest" parameter.
///
/// Host functions taking a `Variadic` parameter can be constructed but are
/// rejected when exported to Lua.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variadic<T>(pub Vec<T>);

impl<T: FromLua> FromLua for Variadic<T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::Variadic(Box::new(T::type_desc()))
    }

    fn from_lua(value: Value) -> LuaResult<Self> {
        Vec::<T>::from_lua(value).map(Variadic)
    }
}

/// An explicit list of call arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiValue(pub Vec<Value>);

impl FromIterator<Value> for MultiValue {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Conversion into a list of call arguments
pub trait IntoLuaMulti {
    fn into_lua_multi(self) -> LuaResult<Vec<Value>>;
}

impl<T: IntoLua> IntoLuaMulti for T {
    fn into_lua_multi(self) -> LuaResult<Vec<Value>> {
        Ok(vec![self.into_lua()?])
    }
}

impl IntoLuaMulti for () {
    fn into_lua_multi(self) -> LuaResult<Vec<Value>> {
        Ok(Vec::new())
    }
}

impl IntoLuaMulti for MultiValue {
    fn into_lua_multi(self) -> LuaResult<Vec<Value>> {
        Ok(self.0)
    }
}

/// Values a host function hands back to Lua.
///
/// `return_count` is the declared number of results and is fixed per type.
pub trait HostReturn {
    fn return_count() -> usize;

    fn into_returns(self) -> LuaResult<Vec<Value>>;
}

impl HostReturn for () {
    fn return_count() -> usize {
        0
    }

    fn into_returns(self) -> LuaResult<Vec<Value>> {
        Ok(Vec::new())
    }
}

impl<T: IntoLua> HostReturn for T {
    fn return_count() -> usize {
        1
    }

    fn into_returns(self) -> LuaResult<Vec<Value>> {
        Ok(vec![self.into_lua()?])
    }
}

impl<R: HostReturn, E: std::fmt::Display> HostReturn for Result<R, E> {
    fn return_count() -> usize {
        R::return_count()
    }

    fn into_returns(self) -> LuaResult<Vec<Value>> {
        match self {
            Ok(values) => values.into_returns(),
            Err(e) => Err(LuaError::callback(e.to_string())),
        }
    }
}

macro_rules! impl_tuple {
    ($count:expr; $($name:ident),+) => {
        impl<$($name: IntoLua),+> IntoLuaMulti for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_lua_multi(self) -> LuaResult<Vec<Value>> {
                let ($($name,)+) = self;
                Ok(vec![$($name.into_lua()?),+])
            }
        }

        impl<$($name: IntoLua),+> HostReturn for ($($name,)+) {
            fn return_count() -> usize {
                $count
            }

            #[allow(non_snake_case)]
            fn into_returns(self) -> LuaResult<Vec<Value>> {
                let ($($name,)+) = self;
                Ok(vec![$($name.into_lua()?),+])
            }
        }
    };
}

impl_tuple!(1; A);
impl_tuple!(2; A, B);
impl_tuple!(3; A, B, C);
impl_tuple!(4; A, B, C, D);
impl_tuple!(5; A, B, C, D, E);
impl_tuple!(6; A, B, C, D, E, F);
impl_tuple!(7; A, B, C, D, E, F, G);
impl_tuple!(8; A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_become_f64() {
        assert_eq!(42u8.into_lua().unwrap(), Value::Number(42.0));
        assert_eq!((-42i64).into_lua().unwrap(), Value::Number(-42.0));
        assert_eq!(42.0f32.into_lua().unwrap(), Value::Number(42.0));
    }

    #[test]
    fn test_integer_narrowing_saturates() {
        assert_eq!(u8::from_lua(Value::Number(300.0)).unwrap(), 255);
        assert_eq!(i8::from_lua(Value::Number(-3.9)).unwrap(), -3);
        assert_eq!(u32::from_lua(Value::Number(-1.0)).unwrap(), 0);
    }

    #[test]
    fn test_mismatch_messages() {
        let err = bool::from_lua(Value::Number(1.0)).unwrap_err();
        assert_eq!(err.to_string(), "not a boolean, got number");

        let err = u16::from_lua(Value::Boolean(true)).unwrap_err();
        assert!(err.to_string().starts_with("not a unsigned"));

        let err = Vec::<i32>::from_lua(Value::Number(1.0)).unwrap_err();
        assert!(err.to_string().starts_with("wrong slice argument"));

        let err = HashMap::<String, i32>::from_lua(Value::Nil).unwrap_err();
        assert!(err.to_string().starts_with("not a map"));
    }

    #[test]
    fn test_type_descs() {
        assert_eq!(Vec::<u8>::type_desc(), TypeDesc::Bytes);
        assert_eq!(
            Vec::<String>::type_desc(),
            TypeDesc::Slice(Box::new(TypeDesc::String))
        );
        assert_eq!(
            BTreeMap::<String, f64>::type_desc(),
            TypeDesc::Map(Box::new(TypeDesc::String), Box::new(TypeDesc::F64))
        );
        assert_eq!(
            Variadic::<i32>::type_desc(),
            TypeDesc::Variadic(Box::new(TypeDesc::I32))
        );
    }

    #[test]
    fn test_bytes_from_string_value() {
        let bytes = Vec::<u8>::from_lua(Value::Bytes(b"abc".to_vec())).unwrap();
        assert_eq!(bytes, b"abc");
    }

    #[test]
    fn test_multi_and_returns() {
        let args = (1, "two", true).into_lua_multi().unwrap();
        assert_eq!(
            args,
            vec![
                Value::Number(1.0),
                Value::String("two".into()),
                Value::Boolean(true)
            ]
        );
        assert!(().into_lua_multi().unwrap().is_empty());
        assert_eq!(<(i32, i32)>::return_count(), 2);
        assert_eq!(<Result<String, String>>::return_count(), 1);

        let failed: Result<i32, String> = Err("nope".into());
        let err = failed.into_returns().unwrap_err();
        assert_eq!(err.kind(), "CallbackError");
    }
}
