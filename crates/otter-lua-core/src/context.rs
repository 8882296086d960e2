//! Core Lua context wrapper with safe marshaling, evaluation and calls

use std::ffi::CString;
use std::marker::PhantomData;

use mlua_sys as ffi;
use tracing::{debug, trace};

use crate::bindings::Bindings;
use crate::bridge::BridgeState;
use crate::call;
use crate::config::LuaConfig;
use crate::convert::{FromLua, IntoLua, IntoLuaMulti};
use crate::error::{LuaError, LuaResult};
use crate::eval;
use crate::marshal;
use crate::namespace::NamePath;
use crate::protected::{self, CallOutcome};
use crate::registry::FunctionRegistry;
use crate::stack;
use crate::value::Value;

/// A Lua VM instance
///
/// Owns a `lua_State`, the table of host functions exported into it and the
/// error slot those functions report failures through.
///
/// Every operation comes in two forms: `try_*` returns a [`LuaResult`], and
/// the short form panics with the error message instead.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync` because a Lua state must not be entered
/// from two threads. Use the `otter-lua` engine to share one VM between
/// threads.
pub struct LuaContext {
    state: *mut ffi::lua_State,
    bridge: Box<BridgeState>,
    config: LuaConfig,
    chunk_name: CString,
    /// Marker to make this type !Send + !Sync
    _not_send: PhantomData<*mut ()>,
}

impl LuaContext {
    /// Create a new context with the default configuration
    pub fn new() -> LuaResult<Self> {
        Self::with_config(LuaConfig::default())
    }

    /// Create a new context
    pub fn with_config(config: LuaConfig) -> LuaResult<Self> {
        let chunk_name = CString::new(config.chunk_name.as_str()).map_err(|e| LuaError::Config {
            message: format!("invalid chunk name: {}", e),
        })?;

        // SAFETY: luaL_newstate has no preconditions; the result is checked.
        let state = unsafe { ffi::luaL_newstate() };
        if state.is_null() {
            return Err(LuaError::StateCreation {
                message: "luaL_newstate returned null".to_string(),
            });
        }
        if config.open_libs {
            // SAFETY: `state` is a fresh, valid state.
            unsafe { ffi::luaL_openlibs(state) };
        }

        debug!(
            open_libs = config.open_libs,
            chunk_name = %config.chunk_name,
            "Lua context created"
        );

        Ok(Self {
            state,
            bridge: Box::new(BridgeState::new()),
            config,
            chunk_name,
            _not_send: PhantomData,
        })
    }

    /// Get the raw state pointer
    pub fn raw(&self) -> *mut ffi::lua_State {
        self.state
    }

    pub fn config(&self) -> &LuaConfig {
        &self.config
    }

    /// Host functions exported into this context so far
    pub fn registry(&self) -> &FunctionRegistry {
        &self.bridge.registry
    }

    /// Bind `value` to a dotted global name.
    ///
    /// Missing intermediate tables are created. A segment that already holds
    /// a non-table fails with `NamespaceConflict`; tables created before the
    /// conflict are kept. The value is checked before anything is written,
    /// so an unsupported value leaves the globals untouched.
    ///
    /// # Example
    ///
    /// ```
    /// use otter_lua_core::{HostFunction, LuaContext};
    ///
    /// let lua = LuaContext::new().unwrap();
    /// lua.try_set("math2.add", HostFunction::new(|a: f64, b: f64| a + b)).unwrap();
    /// let out = lua.try_eval("return math2.add(1, 2)").unwrap();
    /// assert_eq!(out[0].as_f64(), Some(3.0));
    /// ```
    pub fn try_set(&self, name: &str, value: impl IntoLua) -> LuaResult<()> {
        let value = value.into_lua()?;
        value.validate()?;
        let path = NamePath::parse(name)?;

        trace!(name, kind = value.type_name(), "Setting global");

        // SAFETY: the guard restores the stack on every path; the container
        // resolved by the path sits at -3 when the leaf is written.
        unsafe {
            let _guard = stack::guard_top(self.state);
            path.resolve_container(self.state)?;
            stack::ensure_stack(self.state, 2)?;
            stack::push_bytes(self.state, path.leaf().as_bytes());
            marshal::push_value(self.state, &self.bridge, value, name)?;
            ffi::lua_rawset(self.state, -3);
        }
        Ok(())
    }

    #[track_caller]
    pub fn set(&self, name: &str, value: impl IntoLua) {
        if let Err(err) = self.try_set(name, value) {
            panic!("{}", err);
        }
    }

    /// Set every binding in order, stopping at the first failure
    pub fn try_set_all(&self, bindings: Bindings) -> LuaResult<()> {
        for (name, value) in bindings {
            self.try_set(&name, value)?;
        }
        Ok(())
    }

    #[track_caller]
    pub fn set_all(&self, bindings: Bindings) {
        if let Err(err) = self.try_set_all(bindings) {
            panic!("{}", err);
        }
    }

    /// Read the global at a dotted name as `T`.
    ///
    /// Missing entries read as nil.
    pub fn try_get<T: FromLua>(&self, name: &str) -> LuaResult<T> {
        let path = NamePath::parse(name)?;
        // SAFETY: the guard pops the pushed value.
        let value = unsafe {
            let _guard = stack::guard_top(self.state);
            if !call::push_path(self.state, &self.bridge, &path)? {
                return Err(LuaError::NamespaceConflict {
                    path: path.to_string(),
                });
            }
            marshal::pull_value(self.state, -1, &T::type_desc())?
        };
        T::from_lua(value)
    }

    #[track_caller]
    pub fn get<T: FromLua>(&self, name: &str) -> T {
        match self.try_get(name) {
            Ok(value) => value,
            Err(err) => panic!("{}", err),
        }
    }

    /// Compile and run `source`, returning every value it returns
    pub fn try_eval(&self, source: &str) -> LuaResult<Vec<Value>> {
        self.eval_inner(source, None)
    }

    #[track_caller]
    pub fn eval(&self, source: &str) -> Vec<Value> {
        match self.try_eval(source) {
            Ok(values) => values,
            Err(err) => panic!("{}", err),
        }
    }

    /// Like [`try_eval`](Self::try_eval), with extra names visible only to
    /// this chunk.
    ///
    /// Names not in `bindings` resolve through the globals, and assignments
    /// to them reach the globals as usual. The bindings themselves are gone
    /// once the call returns.
    pub fn try_eval_with(&self, source: &str, bindings: Bindings) -> LuaResult<Vec<Value>> {
        self.eval_inner(source, Some(bindings))
    }

    #[track_caller]
    pub fn eval_with(&self, source: &str, bindings: Bindings) -> Vec<Value> {
        match self.try_eval_with(source, bindings) {
            Ok(values) => values,
            Err(err) => panic!("{}", err),
        }
    }

    fn eval_inner(&self, source: &str, bindings: Option<Bindings>) -> LuaResult<Vec<Value>> {
        if let Some(bindings) = &bindings {
            for (_, value) in bindings.iter() {
                value.validate()?;
            }
        }

        trace!(
            len = source.len(),
            bindings = bindings.as_ref().map_or(0, Bindings::len),
            "Evaluating chunk"
        );

        // SAFETY: the chunk is pushed above `base`; the guard returns the
        // stack to `base` once the results have been copied out.
        unsafe {
            let _guard = stack::guard_top(self.state);
            let base = ffi::lua_gettop(self.state);

            eval::load_chunk(self.state, source, &self.chunk_name)?;
            if let Some(bindings) = bindings {
                eval::install_overlay(self.state, &self.bridge, bindings)?;
            }
            self.finish_call(base, 0)
        }
    }

    /// Call the Lua function at a dotted name
    pub fn try_call(&self, name: &str, args: impl IntoLuaMulti) -> LuaResult<Vec<Value>> {
        let args = args.into_lua_multi()?;
        for arg in &args {
            arg.validate()?;
        }
        let path = NamePath::parse(name)?;

        trace!(name, args = args.len(), "Calling Lua function");

        // SAFETY: function and arguments are pushed above `base`; the guard
        // returns the stack to `base` on every path.
        unsafe {
            let _guard = stack::guard_top(self.state);
            let base = ffi::lua_gettop(self.state);

            call::push_function(self.state, &self.bridge, &path)?;
            stack::ensure_stack(self.state, args.len())?;
            let nargs = args.len() as std::ffi::c_int;
            for arg in args {
                marshal::push_value(self.state, &self.bridge, arg, name)?;
            }
            self.finish_call(base, nargs)
        }
    }

    #[track_caller]
    pub fn call(&self, name: &str, args: impl IntoLuaMulti) -> Vec<Value> {
        match self.try_call(name, args) {
            Ok(values) => values,
            Err(err) => panic!("{}", err),
        }
    }

    /// Run the prepared call above `base` and collect its results.
    unsafe fn finish_call(&self, base: std::ffi::c_int, nargs: std::ffi::c_int) -> LuaResult<Vec<Value>> {
        // SAFETY: caller pushed a function and `nargs` arguments above `base`.
        unsafe {
            let outcome = protected::protected_call(self.state, &self.bridge, base, nargs);
            if let CallOutcome::HostError(err) = &outcome {
                debug!(error = %err, "Host function failed during call");
            }
            let count = outcome.into_result()?;
            let results = protected::collect_results(self.state, base, count)?;
            trace!(results = results.len(), "Call returned");
            Ok(results)
        }
    }

    /// Close the VM. Equivalent to dropping the context.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for LuaContext {
    fn drop(&mut self) {
        debug!(
            functions = self.bridge.registry.len(),
            "Closing Lua context"
        );
        // SAFETY: `state` came from luaL_newstate and is closed exactly
        // once. The bridge box is dropped after this body runs, so no
        // closure can observe a dangling pointer during lua_close.
        unsafe { ffi::lua_close(self.state) };
    }
}
