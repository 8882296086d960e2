//! Small helpers over the raw Lua stack API.

use std::ffi::c_int;
use std::ptr;

use mlua_sys as ffi;
use scopeguard::ScopeGuard;

use crate::error::{LuaError, LuaResult};

/// Restore the stack to its current height when the guard drops.
///
/// # Safety
/// `state` must stay valid until the guard is dropped.
pub(crate) unsafe fn guard_top(state: *mut ffi::lua_State) -> ScopeGuard<c_int, impl FnOnce(c_int)> {
    // SAFETY: caller guarantees `state` is a live Lua state.
    let top = unsafe { ffi::lua_gettop(state) };
    scopeguard::guard(top, move |top| {
        // SAFETY: the guard never outlives `state`.
        unsafe { ffi::lua_settop(state, top) }
    })
}

/// Make room for `extra` more slots.
///
/// # Safety
/// `state` must be a valid Lua state.
pub(crate) unsafe fn ensure_stack(state: *mut ffi::lua_State, extra: usize) -> LuaResult<()> {
    let extra = c_int::try_from(extra)
        .map_err(|_| LuaError::internal(format!("stack request too large: {}", extra)))?;
    // SAFETY: caller guarantees `state` is valid.
    if unsafe { ffi::lua_checkstack(state, extra) } == 0 {
        return Err(LuaError::internal(format!(
            "stack overflow (cannot grow by {} slots)",
            extra
        )));
    }
    Ok(())
}

/// # Safety
/// `state` must be a valid Lua state with one free slot.
pub(crate) unsafe fn push_bytes(state: *mut ffi::lua_State, bytes: &[u8]) {
    // SAFETY: lua_pushlstring copies `bytes`; it may contain NULs.
    unsafe {
        ffi::lua_pushlstring(state, bytes.as_ptr().cast(), bytes.len());
    }
}

/// Copy the string at `index` without coercing numbers in place.
///
/// # Safety
/// `state` must be valid and `index` acceptable.
pub(crate) unsafe fn to_bytes(state: *mut ffi::lua_State, index: c_int) -> Option<Vec<u8>> {
    // SAFETY: only called on string slots, so lua_tolstring does not modify the stack.
    unsafe {
        if ffi::lua_type(state, index) != ffi::LUA_TSTRING {
            return None;
        }
        let mut len = 0usize;
        let data = ffi::lua_tolstring(state, index, &mut len);
        if data.is_null() {
            return None;
        }
        Some(std::slice::from_raw_parts(data.cast::<u8>(), len).to_vec())
    }
}

/// # Safety
/// `state` must be valid and `index` acceptable.
pub(crate) unsafe fn to_string_lossy(state: *mut ffi::lua_State, index: c_int) -> Option<String> {
    // SAFETY: forwarded from the caller.
    unsafe { to_bytes(state, index) }.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Render an error object left by a failed load or call.
///
/// # Safety
/// `state` must be valid and `index` acceptable.
pub(crate) unsafe fn error_text(state: *mut ffi::lua_State, index: c_int) -> String {
    // SAFETY: forwarded from the caller.
    unsafe {
        match ffi::lua_type(state, index) {
            ffi::LUA_TSTRING => to_string_lossy(state, index).unwrap_or_default(),
            ffi::LUA_TNUMBER => ffi::lua_tonumberx(state, index, ptr::null_mut()).to_string(),
            ty => format!("(error object is a {} value)", type_name(ty)),
        }
    }
}

/// Capture `stack traceback:` text for `state`, starting at `level`.
///
/// # Safety
/// `state` must be a valid Lua state.
pub(crate) unsafe fn traceback(state: *mut ffi::lua_State, level: c_int) -> String {
    // SAFETY: luaL_traceback pushes one string, which is read and popped.
    unsafe {
        if ffi::lua_checkstack(state, 2) == 0 {
            return String::new();
        }
        ffi::luaL_traceback(state, state, ptr::null(), level);
        let text = to_string_lossy(state, -1).unwrap_or_default();
        ffi::lua_pop(state, 1);
        text
    }
}

pub(crate) fn type_name(ty: c_int) -> &'static str {
    match ty {
        ffi::LUA_TNONE => "no value",
        ffi::LUA_TNIL => "nil",
        ffi::LUA_TBOOLEAN => "boolean",
        ffi::LUA_TLIGHTUSERDATA | ffi::LUA_TUSERDATA => "userdata",
        ffi::LUA_TNUMBER => "number",
        ffi::LUA_TSTRING => "string",
        ffi::LUA_TTABLE => "table",
        ffi::LUA_TFUNCTION => "function",
        ffi::LUA_TTHREAD => "thread",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct State(*mut ffi::lua_State);

    impl Drop for State {
        fn drop(&mut self) {
            unsafe { ffi::lua_close(self.0) }
        }
    }

    fn new_state() -> State {
        let state = unsafe { ffi::luaL_newstate() };
        assert!(!state.is_null());
        State(state)
    }

    #[test]
    fn test_bytes_with_nul() {
        let state = new_state();
        unsafe {
            push_bytes(state.0, b"a\0b");
            assert_eq!(to_bytes(state.0, -1), Some(b"a\0b".to_vec()));
            assert_eq!(type_name(ffi::lua_type(state.0, -1)), "string");
        }
    }

    #[test]
    fn test_to_bytes_does_not_coerce_numbers() {
        let state = new_state();
        unsafe {
            ffi::lua_pushnumber(state.0, 42.0);
            assert_eq!(to_bytes(state.0, -1), None);
            assert_eq!(ffi::lua_type(state.0, -1), ffi::LUA_TNUMBER);
        }
    }

    #[test]
    fn test_guard_restores_top() {
        let state = new_state();
        unsafe {
            ffi::lua_pushnil(state.0);
            {
                let _guard = guard_top(state.0);
                ffi::lua_pushnil(state.0);
                ffi::lua_pushnil(state.0);
                assert_eq!(ffi::lua_gettop(state.0), 3);
            }
            assert_eq!(ffi::lua_gettop(state.0), 1);
        }
    }

    #[test]
    fn test_error_text_for_tables() {
        let state = new_state();
        unsafe {
            ffi::lua_createtable(state.0, 0, 0);
            assert_eq!(error_text(state.0, -1), "(error object is a table value)");
        }
    }

    #[test]
    fn test_traceback_text() {
        let state = new_state();
        let text = unsafe { traceback(state.0, 0) };
        assert!(text.starts_with("stack traceback:"));
        assert_eq!(unsafe { ffi::lua_gettop(state.0) }, 0);
    }
}
