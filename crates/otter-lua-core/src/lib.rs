//! Value marshaling between Rust and an embedded Lua 5.4 VM.
//!
//! This crate talks to Lua only through its C stack API (via `mlua-sys`).
//! Host values are projected onto [`Value`], pushed onto the Lua stack, and
//! pulled back against a [`TypeDesc`] chosen by the host. Rust closures can
//! be exported as Lua functions, and Lua functions can be called from Rust.
//!
//! # Example
//!
//! ```
//! use otter_lua_core::{HostFunction, LuaContext, Value};
//!
//! let lua = LuaContext::new().unwrap();
//! lua.set("greet", HostFunction::new(|name: String| format!("hello, {}", name)));
//!
//! let out = lua.eval("return greet('otter')");
//! assert_eq!(out, vec![Value::String("hello, otter".into())]);
//! ```
//!
//! # Errors
//!
//! Host functions never raise Lua errors. A failure inside one (wrong
//! argument count, a conversion error, an `Err` return or a panic) is
//! recorded and the surrounding `eval`/`call` fails with
//! [`LuaError::Call`], carrying a traceback taken where the failure was
//! detected.
//!
//! # Thread Safety
//!
//! [`LuaContext`] is `!Send` and `!Sync`. For multi-threaded usage, use
//! `otter-lua`'s `LuaEngineHandle`, which marshals operations to a
//! dedicated worker thread.
//!
//! ```compile_fail
//! use otter_lua_core::LuaContext;
//! use std::thread;
//!
//! let lua = LuaContext::new().unwrap();
//! thread::spawn(move || {
//!     lua.eval("return 1"); // Error: LuaContext is !Send
//! });
//! ```

mod bindings;
mod bridge;
mod call;
pub mod config;
mod context;
mod convert;
pub mod error;
mod eval;
mod function;
mod marshal;
mod namespace;
mod protected;
mod registry;
mod slot;
mod stack;
mod types;
mod value;

pub use bindings::Bindings;
pub use config::LuaConfig;
pub use context::LuaContext;
pub use convert::{FromLua, HostReturn, IntoLua, IntoLuaMulti, MultiValue, Variadic};
pub use error::{ConversionKind, LuaError, LuaResult};
pub use function::{HostFunction, IntoHostFunction};
pub use namespace::NamePath;
pub use registry::{FunctionRegistry, RegisteredFunction};
pub use types::TypeDesc;
pub use value::{LightPointer, Value};

/// Re-export of the raw Lua bindings used by this crate
pub use mlua_sys as ffi;
