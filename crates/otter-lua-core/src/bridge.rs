//! Trampoline from Lua into registered host functions.
//!
//! Every exported host function is a C closure over two upvalues: a pointer
//! to the owning context's [`BridgeState`] and the function's registry id.
//! The trampoline never raises a Lua error. Failures are recorded in the
//! error slot and the closure returns no values; the caller of the
//! surrounding protected call picks the failure up from the slot.

use std::ffi::c_int;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use mlua_sys as ffi;
use tracing::trace;

use crate::error::{LuaError, LuaResult};
use crate::marshal;
use crate::registry::{FunctionRegistry, RegisteredFunction};
use crate::slot::ErrorSlot;
use crate::stack;
use crate::types::TypeDesc;
use crate::value::Value;

/// Host-side state shared with every exported closure of one context
#[derive(Debug)]
pub(crate) struct BridgeState {
    pub(crate) registry: FunctionRegistry,
    pub(crate) slot: ErrorSlot,
}

impl BridgeState {
    pub(crate) fn new() -> Self {
        Self {
            registry: FunctionRegistry::new(),
            slot: ErrorSlot::new(),
        }
    }
}

/// Entry point for every host function called from Lua.
///
/// # Safety
/// Only called by Lua for closures created by `marshal::push_value`, whose
/// upvalues hold a live `BridgeState` pointer and a registry id.
pub(crate) unsafe extern "C-unwind" fn invoke_host_function(state: *mut ffi::lua_State) -> c_int {
    // SAFETY: upvalue 1 was set to a pointer to the context's boxed
    // BridgeState, which lives until the Lua state is closed.
    let bridge = unsafe {
        let ptr = ffi::lua_touserdata(state, ffi::lua_upvalueindex(1)) as *const BridgeState;
        match ptr.as_ref() {
            Some(bridge) => bridge,
            None => return 0,
        }
    };
    // SAFETY: upvalue 2 is the integer id pushed alongside the pointer.
    let id = unsafe { ffi::lua_tointegerx(state, ffi::lua_upvalueindex(2), ptr::null_mut()) };

    let Some(entry) = u32::try_from(id).ok().and_then(|id| bridge.registry.get(id)) else {
        let err = LuaError::internal(format!("unknown host function id {}", id));
        // SAFETY: `state` is the running Lua state.
        let traceback = unsafe { stack::traceback(state, 1) };
        bridge.slot.set(LuaError::host_failure(err.to_string(), Some(traceback), err));
        return 0;
    };

    let function = &entry.function;
    if function.arity() == 0 && function.returns() == 0 {
        trace!(id = entry.id, name = %entry.name, "Calling host function (fast path)");
        if let Err(err) = run_guarded(&entry, Vec::new()) {
            // SAFETY: `state` is the running Lua state.
            unsafe { report(state, bridge, &entry, err) };
        }
        return 0;
    }

    // SAFETY: `state` is the running Lua state and its arguments sit in
    // slots 1..=top.
    match unsafe { call_entry(state, bridge, &entry) } {
        Ok(count) => count,
        Err(err) => {
            // SAFETY: as above.
            unsafe { report(state, bridge, &entry, err) };
            0
        }
    }
}

unsafe fn call_entry(
    state: *mut ffi::lua_State,
    bridge: &BridgeState,
    entry: &RegisteredFunction,
) -> LuaResult<c_int> {
    let function = &entry.function;
    // SAFETY: caller guarantees `state` is the running state.
    let actual = unsafe { ffi::lua_gettop(state) } as usize;
    if actual != function.arity() {
        return Err(LuaError::ArgumentCount {
            expected: function.arity(),
            actual,
        });
    }

    trace!(id = entry.id, name = %entry.name, args = actual, "Calling host function");

    let mut args = Vec::with_capacity(actual);
    for (i, param) in function.params().iter().enumerate() {
        let index = (i + 1) as c_int;
        // SAFETY: `index` is within 1..=top.
        let is_nil = unsafe { ffi::lua_type(state, index) } == ffi::LUA_TNIL;
        let value = if is_nil && *param != TypeDesc::Any {
            param.zero_value()
        } else {
            // SAFETY: as above.
            unsafe { marshal::pull_value(state, index, param) }
                .map_err(|err| argument_error(i + 1, err))?
        };
        args.push(value);
    }

    let results = run_guarded(entry, args)?;

    // SAFETY: push_value restores the stack on failure; Lua only looks at
    // the top `count` slots when the closure returns.
    unsafe {
        stack::ensure_stack(state, results.len())?;
        ffi::lua_settop(state, 0);
        let count = results.len();
        for value in results {
            marshal::push_value(state, bridge, value, &entry.name)?;
        }
        Ok(count as c_int)
    }
}

fn argument_error(position: usize, err: LuaError) -> LuaError {
    match err {
        LuaError::TypeConversion { kind, actual } => LuaError::TypeConversion {
            kind,
            actual: format!("{} (argument #{})", actual, position),
        },
        other => other,
    }
}

/// Run the host callable, turning a panic into a callback error.
fn run_guarded(entry: &RegisteredFunction, args: Vec<Value>) -> LuaResult<Vec<Value>> {
    match catch_unwind(AssertUnwindSafe(|| entry.function.invoke(args))) {
        Ok(result) => result,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(LuaError::callback(format!("panicked: {}", message)))
        }
    }
}

/// Record `err` in the slot, prefixed with the function name.
unsafe fn report(
    state: *mut ffi::lua_State,
    bridge: &BridgeState,
    entry: &RegisteredFunction,
    err: LuaError,
) {
    // SAFETY: forwarded from the caller.
    let traceback = unsafe { stack::traceback(state, 1) };
    let message = format!("{}: {}", entry.name, err);
    bridge.slot.set(LuaError::host_failure(message, Some(traceback), err));
}
