//! Compiling source text and scoping per-call bindings.

use std::ffi::CStr;

use mlua_sys as ffi;

use crate::bindings::Bindings;
use crate::bridge::BridgeState;
use crate::error::{LuaError, LuaResult};
use crate::marshal;
use crate::stack;

/// Compile `source` and push the resulting function.
///
/// # Safety
/// `state` must be a valid Lua state.
pub(crate) unsafe fn load_chunk(
    state: *mut ffi::lua_State,
    source: &str,
    chunk_name: &CStr,
) -> LuaResult<()> {
    // SAFETY: luaL_loadbufferx copies the buffer and pushes either the
    // compiled chunk or an error message.
    unsafe {
        stack::ensure_stack(state, 1)?;
        let status = ffi::luaL_loadbufferx(
            state,
            source.as_ptr().cast(),
            source.len(),
            chunk_name.as_ptr(),
            c"t".as_ptr(),
        );
        if status != ffi::LUA_OK {
            let message = stack::error_text(state, -1);
            ffi::lua_pop(state, 1);
            return Err(LuaError::Load { message });
        }
    }
    Ok(())
}

/// Give the chunk on top of the stack a private environment.
///
/// The environment holds `bindings` and falls back to the global table for
/// reads and writes of every other name, so assignments to existing globals
/// stay visible while the bindings themselves never reach `_G`.
///
/// # Safety
/// `state` must be the Lua state `bridge` belongs to, with a freshly loaded
/// chunk on top of the stack.
pub(crate) unsafe fn install_overlay(
    state: *mut ffi::lua_State,
    bridge: &BridgeState,
    bindings: Bindings,
) -> LuaResult<()> {
    // SAFETY: pushes an environment table and metatable, then moves the
    // table into the chunk's first upvalue (`_ENV`). The guard drops the
    // partial environment if a binding fails to marshal.
    unsafe {
        stack::ensure_stack(state, 4)?;
        let guard = stack::guard_top(state);

        ffi::lua_createtable(state, 0, bindings.len() as std::ffi::c_int);
        for (name, value) in bindings {
            stack::push_bytes(state, name.as_bytes());
            marshal::push_value(state, bridge, value, &name)?;
            ffi::lua_rawset(state, -3);
        }

        ffi::lua_createtable(state, 0, 2);
        ffi::lua_pushglobaltable(state);
        ffi::lua_setfield(state, -2, c"__index".as_ptr());
        ffi::lua_pushglobaltable(state);
        ffi::lua_setfield(state, -2, c"__newindex".as_ptr());
        ffi::lua_setmetatable(state, -2);

        if ffi::lua_setupvalue(state, -2, 1).is_null() {
            return Err(LuaError::internal("chunk has no _ENV upvalue"));
        }
        scopeguard::ScopeGuard::into_inner(guard);
    }
    Ok(())
}
