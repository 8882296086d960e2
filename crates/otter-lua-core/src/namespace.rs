//! Dotted name paths such as `"foo.bar.baz"`.

use std::fmt;
use std::str::FromStr;

use mlua_sys as ffi;

use crate::error::{LuaError, LuaResult};
use crate::stack;

/// A parsed dotted name: zero or more container segments and a leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePath {
    containers: Vec<String>,
    leaf: String,
}

impl NamePath {
    /// Parse a dotted name. Empty names and empty segments are rejected.
    pub fn parse(name: &str) -> LuaResult<Self> {
        let invalid = || LuaError::InvalidName {
            name: name.to_string(),
        };

        let mut segments: Vec<String> = name.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(invalid());
        }
        let leaf = segments.pop().ok_or_else(invalid)?;
        Ok(Self {
            containers: segments,
            leaf,
        })
    }

    pub fn containers(&self) -> &[String] {
        &self.containers
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.containers
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.leaf.as_str()))
    }

    /// Push the container the leaf is written into.
    ///
    /// Starts at the global table and creates every missing level. A level
    /// that exists but is not a table fails with `NamespaceConflict`; levels
    /// created before the conflict are kept. On success exactly one table is
    /// left on top of the stack.
    ///
    /// # Safety
    /// `state` must be a valid Lua state.
    pub(crate) unsafe fn resolve_container(&self, state: *mut ffi::lua_State) -> LuaResult<()> {
        // SAFETY: each step replaces the current table with the next level,
        // keeping one extra slot on the stack; the guard cleans up on error.
        unsafe {
            stack::ensure_stack(state, 4)?;
            let guard = stack::guard_top(state);
            ffi::lua_pushglobaltable(state);

            for (depth, segment) in self.containers.iter().enumerate() {
                stack::push_bytes(state, segment.as_bytes());
                match ffi::lua_rawget(state, -2) {
                    ffi::LUA_TTABLE => {}
                    ffi::LUA_TNIL => {
                        ffi::lua_pop(state, 1);
                        ffi::lua_createtable(state, 0, 0);
                        stack::push_bytes(state, segment.as_bytes());
                        ffi::lua_pushvalue(state, -2);
                        ffi::lua_rawset(state, -4);
                    }
                    _ => {
                        return Err(LuaError::NamespaceConflict {
                            path: self.containers[..=depth].join("."),
                        });
                    }
                }
                ffi::lua_remove(state, -2);
            }

            scopeguard::ScopeGuard::into_inner(guard);
        }
        Ok(())
    }
}

impl FromStr for NamePath {
    type Err = LuaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for container in &self.containers {
            write!(f, "{}.", container)?;
        }
        f.write_str(&self.leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let path = NamePath::parse("print").unwrap();
        assert!(path.containers().is_empty());
        assert_eq!(path.leaf(), "print");
    }

    #[test]
    fn test_parse_dotted() {
        let path: NamePath = "foo.bar.baz".parse().unwrap();
        assert_eq!(path.containers(), &["foo", "bar"]);
        assert_eq!(path.leaf(), "baz");
        assert_eq!(path.to_string(), "foo.bar.baz");
        assert_eq!(path.segments().collect::<Vec<_>>(), vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        for name in ["", ".", "a..b", ".a", "a."] {
            let err = NamePath::parse(name).unwrap_err();
            assert_eq!(err.kind(), "InvalidNameError", "name {:?}", name);
        }
    }
}
