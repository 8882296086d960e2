//! Moving [`Value`]s onto and off the Lua stack.
//!
//! Pushing is driven by the shape of the host value. Pulling is driven by
//! the [`TypeDesc`] the host expects, so the same Lua slot can be read as
//! an integer, a float or a generic value depending on the caller.

use std::ffi::{c_int, c_void};
use std::ptr;

use mlua_sys as ffi;
use scopeguard::ScopeGuard;

use crate::bridge::{self, BridgeState};
use crate::error::{ConversionKind, LuaError, LuaResult};
use crate::function::HostFunction;
use crate::stack;
use crate::types::TypeDesc;
use crate::value::{LightPointer, Value};

/// Push one value. On error the stack is left as it was.
///
/// # Safety
/// `state` must be the Lua state that `bridge` belongs to.
pub(crate) unsafe fn push_value(
    state: *mut ffi::lua_State,
    bridge: &BridgeState,
    value: Value,
    name: &str,
) -> LuaResult<()> {
    // SAFETY: caller guarantees `state` is valid for the guard's lifetime.
    let guard = unsafe { stack::guard_top(state) };
    // SAFETY: forwarded from the caller.
    unsafe { push_inner(state, bridge, value, name) }?;
    ScopeGuard::into_inner(guard);
    Ok(())
}

unsafe fn push_inner(
    state: *mut ffi::lua_State,
    bridge: &BridgeState,
    value: Value,
    name: &str,
) -> LuaResult<()> {
    // SAFETY: every branch pushes exactly one slot after reserving room.
    unsafe {
        stack::ensure_stack(state, 3)?;
        match value {
            Value::Nil => ffi::lua_pushnil(state),
            Value::Boolean(b) => ffi::lua_pushboolean(state, c_int::from(b)),
            Value::Number(n) => ffi::lua_pushnumber(state, n),
            Value::String(s) => stack::push_bytes(state, s.as_bytes()),
            Value::Bytes(b) => stack::push_bytes(state, &b),
            Value::Pointer(p) => ffi::lua_pushlightuserdata(state, p.as_ptr()),
            Value::Array(items) => {
                ffi::lua_createtable(state, table_hint(items.len()), 0);
                for (i, item) in items.into_iter().enumerate() {
                    push_inner(state, bridge, item, name)?;
                    ffi::lua_rawseti(state, -2, (i + 1) as ffi::lua_Integer);
                }
            }
            Value::Map(entries) => {
                ffi::lua_createtable(state, 0, table_hint(entries.len()));
                for (key, value) in entries {
                    match &key {
                        Value::Nil => return Err(LuaError::unsupported("nil as table key")),
                        Value::Number(n) if n.is_nan() => {
                            return Err(LuaError::unsupported("NaN as table key"));
                        }
                        _ => {}
                    }
                    push_inner(state, bridge, key, name)?;
                    push_inner(state, bridge, value, name)?;
                    ffi::lua_rawset(state, -3);
                }
            }
            Value::Function(function) => push_function(state, bridge, function, name)?,
        }
    }
    Ok(())
}

fn table_hint(len: usize) -> c_int {
    c_int::try_from(len).unwrap_or(c_int::MAX)
}

/// Register `function` and push a closure that dispatches to it.
unsafe fn push_function(
    state: *mut ffi::lua_State,
    bridge: &BridgeState,
    function: HostFunction,
    name: &str,
) -> LuaResult<()> {
    if function.is_variadic() {
        return Err(LuaError::unsupported(format!(
            "variadic function {}",
            function.signature()
        )));
    }

    let name = if name.is_empty() { "<anonymous>" } else { name };
    let id = bridge.registry.register(name, function);

    // SAFETY: `bridge` is boxed by the owning context and outlives every
    // closure created in its Lua state. Stack room was reserved by the caller.
    unsafe {
        ffi::lua_pushlightuserdata(state, bridge as *const BridgeState as *mut c_void);
        ffi::lua_pushinteger(state, ffi::lua_Integer::from(id));
        ffi::lua_pushcclosure(state, bridge::invoke_host_function, 2);
    }
    Ok(())
}

/// Pull the slot at `index` as `target`. The stack is left unchanged.
///
/// # Safety
/// `state` must be valid and `index` acceptable.
pub(crate) unsafe fn pull_value(
    state: *mut ffi::lua_State,
    index: c_int,
    target: &TypeDesc,
) -> LuaResult<Value> {
    // SAFETY: all reads below stay within the caller-provided slot and
    // table iteration restores the stack through a guard.
    unsafe {
        let index = ffi::lua_absindex(state, index);
        let ty = ffi::lua_type(state, index);
        let mismatch = |kind| LuaError::conversion(kind, stack::type_name(ty));

        match target {
            TypeDesc::Bool => match ty {
                ffi::LUA_TBOOLEAN => Ok(Value::Boolean(ffi::lua_toboolean(state, index) != 0)),
                _ => Err(mismatch(ConversionKind::Boolean)),
            },
            t if t.is_signed() || t.is_unsigned() => match ty {
                ffi::LUA_TNUMBER => Ok(Value::Number(to_number(state, index).trunc())),
                _ if t.is_signed() => Err(mismatch(ConversionKind::Integer)),
                _ => Err(mismatch(ConversionKind::Unsigned)),
            },
            t if t.is_float() => match ty {
                ffi::LUA_TNUMBER => Ok(Value::Number(to_number(state, index))),
                _ => Err(mismatch(ConversionKind::Float)),
            },
            TypeDesc::String => stack::to_string_lossy(state, index)
                .map(Value::String)
                .ok_or_else(|| mismatch(ConversionKind::String)),
            TypeDesc::Bytes => match ty {
                ffi::LUA_TSTRING => Ok(Value::Bytes(
                    stack::to_bytes(state, index).unwrap_or_default(),
                )),
                ffi::LUA_TTABLE => pull_sequence(state, index, &TypeDesc::U8),
                _ => Err(mismatch(ConversionKind::Slice)),
            },
            TypeDesc::Any => pull_any(state, index, ty),
            TypeDesc::Pointer => match ty {
                ffi::LUA_TLIGHTUSERDATA | ffi::LUA_TUSERDATA => Ok(Value::Pointer(
                    LightPointer::new(ffi::lua_touserdata(state, index)),
                )),
                _ => Err(mismatch(ConversionKind::Pointer)),
            },
            TypeDesc::Map(key, value) => match ty {
                ffi::LUA_TTABLE => pull_map(state, index, key, value),
                _ => Err(mismatch(ConversionKind::Map)),
            },
            TypeDesc::Slice(elem) => match ty {
                ffi::LUA_TTABLE => pull_sequence(state, index, elem),
                _ => Err(mismatch(ConversionKind::Slice)),
            },
            other => Err(LuaError::unsupported(other.to_string())),
        }
    }
}

unsafe fn to_number(state: *mut ffi::lua_State, index: c_int) -> f64 {
    // SAFETY: only called on number slots.
    unsafe { ffi::lua_tonumberx(state, index, ptr::null_mut()) }
}

/// The generic target holds scalars, pointers and nil only.
unsafe fn pull_any(state: *mut ffi::lua_State, index: c_int, ty: c_int) -> LuaResult<Value> {
    // SAFETY: forwarded from `pull_value`.
    unsafe {
        match ty {
            ffi::LUA_TNIL | ffi::LUA_TNONE => Ok(Value::Nil),
            ffi::LUA_TBOOLEAN => Ok(Value::Boolean(ffi::lua_toboolean(state, index) != 0)),
            ffi::LUA_TNUMBER => Ok(Value::Number(to_number(state, index))),
            ffi::LUA_TSTRING => {
                let bytes = stack::to_bytes(state, index).unwrap_or_default();
                Ok(match String::from_utf8(bytes) {
                    Ok(s) => Value::String(s),
                    Err(e) => Value::Bytes(e.into_bytes()),
                })
            }
            ffi::LUA_TLIGHTUSERDATA | ffi::LUA_TUSERDATA => Ok(Value::Pointer(LightPointer::new(
                ffi::lua_touserdata(state, index),
            ))),
            other => Err(LuaError::unsupported(format!(
                "{} for any",
                stack::type_name(other)
            ))),
        }
    }
}

/// Iterate a table with `lua_next`, pulling each entry.
unsafe fn for_each_entry(
    state: *mut ffi::lua_State,
    table: c_int,
    mut f: impl FnMut(c_int, c_int) -> LuaResult<()>,
) -> LuaResult<()> {
    // SAFETY: `table` is an absolute index of a table; the guard drops any
    // key/value pair left behind by an early return.
    unsafe {
        stack::ensure_stack(state, 3)?;
        let _guard = stack::guard_top(state);
        ffi::lua_pushnil(state);
        while ffi::lua_next(state, table) != 0 {
            let top = ffi::lua_gettop(state);
            f(top - 1, top)?;
            ffi::lua_pop(state, 1);
        }
    }
    Ok(())
}

unsafe fn pull_sequence(
    state: *mut ffi::lua_State,
    table: c_int,
    elem: &TypeDesc,
) -> LuaResult<Value> {
    let mut items = Vec::new();
    // SAFETY: forwarded from `pull_value`.
    unsafe {
        for_each_entry(state, table, |_, value| {
            items.push(pull_value(state, value, elem)?);
            Ok(())
        })?;
    }
    Ok(Value::Array(items))
}

unsafe fn pull_map(
    state: *mut ffi::lua_State,
    table: c_int,
    key: &TypeDesc,
    value: &TypeDesc,
) -> LuaResult<Value> {
    let mut entries = Vec::new();
    // SAFETY: forwarded from `pull_value`.
    unsafe {
        for_each_entry(state, table, |k, v| {
            entries.push((pull_value(state, k, key)?, pull_value(state, v, value)?));
            Ok(())
        })?;
    }
    Ok(Value::Map(entries))
}
