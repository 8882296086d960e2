//! Name/value pairs for `set_all` and scoped evaluation.

use crate::convert::IntoLua;
use crate::error::{LuaError, LuaResult};
use crate::value::Value;

/// An ordered list of name/value bindings
///
/// # Example
///
/// ```
/// use otter_lua_core::Bindings;
///
/// let bindings = Bindings::new().bind("x", 1).unwrap().bind("y", "two").unwrap();
/// assert_eq!(bindings.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    entries: Vec<(String, Value)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding, converting the value.
    pub fn bind(mut self, name: impl Into<String>, value: impl IntoLua) -> LuaResult<Self> {
        self.entries.push((name.into(), value.into_lua()?));
        Ok(self)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), value));
    }

    /// Build from an alternating `name, value, name, value, ...` list.
    pub fn from_flat(values: Vec<Value>) -> LuaResult<Self> {
        if values.len() % 2 != 0 {
            return Err(LuaError::InvalidBindings {
                message: "number of arguments not match, check your program.".to_string(),
            });
        }

        let mut entries = Vec::with_capacity(values.len() / 2);
        let mut values = values.into_iter();
        while let (Some(name), Some(value)) = (values.next(), values.next()) {
            let name = match name {
                Value::String(name) => name,
                other => {
                    return Err(LuaError::InvalidBindings {
                        message: format!("name must be string, not {}", other.type_name()),
                    });
                }
            };
            entries.push((name, value));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl TryFrom<Vec<Value>> for Bindings {
    type Error = LuaError;

    fn try_from(values: Vec<Value>) -> LuaResult<Self> {
        Self::from_flat(values)
    }
}

impl IntoIterator for Bindings {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (S, Value)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flat() {
        let bindings = Bindings::from_flat(vec![
            Value::String("a".into()),
            Value::Number(1.0),
            Value::String("b".into()),
            Value::Nil,
        ])
        .unwrap();

        let names: Vec<_> = bindings.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_from_flat_odd_length() {
        let err = Bindings::from_flat(vec![Value::String("a".into())]).unwrap_err();
        assert!(err.to_string().contains("number of arguments not match"));
    }

    #[test]
    fn test_from_flat_non_string_name() {
        let err =
            Bindings::try_from(vec![Value::Number(1.0), Value::Boolean(true)]).unwrap_err();
        assert!(err.to_string().contains("name must be string"));
        assert_eq!(err.kind(), "InvalidBindingsError");
    }

    #[test]
    fn test_collect() {
        let bindings: Bindings = vec![("x", Value::Number(2.0))].into_iter().collect();
        assert_eq!(bindings.len(), 1);
        assert!(!bindings.is_empty());
    }
}
