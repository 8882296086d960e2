//! Looking up Lua values and functions by dotted path.
//!
//! Segments are resolved with ordinary indexing, so `__index` metamethods
//! take part. The walk runs inside a protected call: a metamethod that
//! raises surfaces as a call error instead of unwinding through the host.

use std::ffi::c_int;

use mlua_sys as ffi;

use crate::bridge::BridgeState;
use crate::error::{LuaError, LuaResult};
use crate::namespace::NamePath;
use crate::protected;
use crate::stack;

/// Walks the path given as string arguments, starting at the global table.
///
/// Returns `true, value` on success, or a single `false` when a segment
/// before the last one is neither a table nor nil.
unsafe extern "C-unwind" fn walk_path(state: *mut ffi::lua_State) -> c_int {
    // SAFETY: called through lua_pcall with one string per segment. At most
    // three slots are used beyond the arguments, well under LUA_MINSTACK.
    // Nothing with a destructor lives in this frame, so an error raised by
    // lua_gettable can unwind through it.
    unsafe {
        let count = ffi::lua_gettop(state);
        ffi::lua_pushglobaltable(state);

        for i in 1..=count {
            match ffi::lua_type(state, -1) {
                ffi::LUA_TTABLE => {
                    ffi::lua_pushvalue(state, i);
                    ffi::lua_gettable(state, -2);
                    ffi::lua_remove(state, -2);
                }
                ffi::LUA_TNIL => {}
                _ => {
                    ffi::lua_pushboolean(state, 0);
                    return 1;
                }
            }
        }

        ffi::lua_pushboolean(state, 1);
        ffi::lua_insert(state, -2);
    }
    2
}

/// Push the value at `path`. Missing entries resolve to nil.
///
/// Returns `false` (with nothing pushed) when a segment before the last one
/// is neither a table nor nil. Errors raised by metamethods come back as
/// `LuaError::Call`.
///
/// # Safety
/// `state` must be the Lua state `bridge` belongs to.
pub(crate) unsafe fn push_path(
    state: *mut ffi::lua_State,
    bridge: &BridgeState,
    path: &NamePath,
) -> LuaResult<bool> {
    // SAFETY: the walker and its arguments are pushed above `base`;
    // protected_call leaves its results there, and exactly the resolved
    // value is kept on success.
    unsafe {
        let base = ffi::lua_gettop(state);
        let guard = stack::guard_top(state);
        let segments: Vec<&str> = path.segments().collect();
        stack::ensure_stack(state, segments.len() + 1)?;

        ffi::lua_pushcfunction(state, walk_path);
        for segment in &segments {
            stack::push_bytes(state, segment.as_bytes());
        }
        let nargs = segments.len() as c_int;

        protected::protected_call(state, bridge, base, nargs).into_result()?;
        if ffi::lua_toboolean(state, base + 1) == 0 {
            return Ok(false);
        }
        ffi::lua_settop(state, base + 2);
        ffi::lua_remove(state, base + 1);

        scopeguard::ScopeGuard::into_inner(guard);
    }
    Ok(true)
}

/// Push the function at `path`.
///
/// Fails with `NotAFunction` when an intermediate segment is not a table or
/// the final value is not a function. The stack is unchanged on failure.
///
/// # Safety
/// `state` must be the Lua state `bridge` belongs to.
pub(crate) unsafe fn push_function(
    state: *mut ffi::lua_State,
    bridge: &BridgeState,
    path: &NamePath,
) -> LuaResult<()> {
    // SAFETY: forwarded from the caller; the pushed value is popped again
    // when it is not a function.
    unsafe {
        if !push_path(state, bridge, path)? {
            return Err(LuaError::NotAFunction {
                path: path.to_string(),
            });
        }
        if ffi::lua_type(state, -1) != ffi::LUA_TFUNCTION {
            ffi::lua_pop(state, 1);
            return Err(LuaError::NotAFunction {
                path: path.to_string(),
            });
        }
    }
    Ok(())
}
