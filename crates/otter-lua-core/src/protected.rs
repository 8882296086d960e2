//! Protected calls with traceback capture and error-slot checking.

use std::ffi::c_int;

use mlua_sys as ffi;
use tracing::trace;

use crate::bridge::BridgeState;
use crate::error::{LuaError, LuaResult};
use crate::marshal;
use crate::stack;
use crate::types::TypeDesc;
use crate::value::Value;

/// How a protected call ended
#[derive(Debug)]
pub(crate) enum CallOutcome {
    /// The call returned this many values
    Returned(c_int),
    /// A host function failed while the call was running
    HostError(LuaError),
    /// The Lua code raised an error
    RuntimeFault(LuaError),
}

impl CallOutcome {
    pub(crate) fn into_result(self) -> LuaResult<c_int> {
        match self {
            Self::Returned(count) => Ok(count),
            Self::HostError(err) | Self::RuntimeFault(err) => Err(err),
        }
    }
}

/// Message handler: appends a traceback to the error object.
unsafe extern "C-unwind" fn traceback_handler(state: *mut ffi::lua_State) -> c_int {
    // SAFETY: called by lua_pcall with the error object at index 1.
    unsafe {
        let message = stack::error_text(state, 1);
        let mut message = message.into_bytes();
        message.push(0);
        ffi::luaL_traceback(state, state, message.as_ptr().cast(), 1);
    }
    1
}

/// Call the function at `base + 1` with the `nargs` values above it.
///
/// `base` is the stack height before the function was pushed. On return
/// the results (if any) occupy `base + 1 ..= top`.
///
/// # Safety
/// `state` must be the Lua state `bridge` belongs to, with a function and
/// `nargs` arguments pushed above `base`.
pub(crate) unsafe fn protected_call(
    state: *mut ffi::lua_State,
    bridge: &BridgeState,
    base: c_int,
    nargs: c_int,
) -> CallOutcome {
    // SAFETY: the handler is inserted below the function so results still
    // start right after it; it is removed again before returning.
    unsafe {
        if let Err(err) = stack::ensure_stack(state, 1) {
            return CallOutcome::RuntimeFault(err);
        }
        ffi::lua_pushcfunction(state, traceback_handler);
        ffi::lua_insert(state, base + 1);

        bridge.slot.clear();
        let status = ffi::lua_pcall(state, nargs, ffi::LUA_MULTRET, base + 1);
        let host_error = bridge.slot.take();

        // A recorded host failure wins over the pcall status.
        if let Some(err) = host_error {
            ffi::lua_settop(state, base);
            return CallOutcome::HostError(err);
        }
        if status != ffi::LUA_OK {
            let text = stack::error_text(state, -1);
            ffi::lua_settop(state, base);
            trace!(status, "Protected call raised an error");
            return CallOutcome::RuntimeFault(LuaError::runtime(text));
        }

        ffi::lua_remove(state, base + 1);
        CallOutcome::Returned(ffi::lua_gettop(state) - base)
    }
}

/// Pull `count` results above `base` as generic values.
///
/// # Safety
/// `state` must be valid with at least `base + count` slots.
pub(crate) unsafe fn collect_results(
    state: *mut ffi::lua_State,
    base: c_int,
    count: c_int,
) -> LuaResult<Vec<Value>> {
    (1..=count)
        // SAFETY: each index is within base+1..=top.
        .map(|i| unsafe { marshal::pull_value(state, base + i, &TypeDesc::Any) })
        .collect()
}
