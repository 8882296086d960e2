//! Thread-confined Lua execution engine
//!
//! `otter-lua-core`'s `LuaContext` is `!Send`: a Lua state must only ever be
//! entered from one thread. This crate runs a single context on a dedicated
//! worker thread and exposes it through a `Send + Sync + Clone` handle with
//! async operations.
//!
//! # Example
//!
//! ```no_run
//! use otter_lua::{Bindings, HostFunction, LuaEngine, Value};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = LuaEngine::builder()
//!         .setup(|lua| lua.try_set("host.len", HostFunction::new(|s: String| s.len() as u32)))
//!         .build()
//!         .unwrap();
//!     let handle = engine.handle();
//!
//!     let bindings = Bindings::new().bind("word", "otter").unwrap();
//!     let out = handle.eval_with("return host.len(word)", bindings).await.unwrap();
//!     assert_eq!(out, vec![Value::Number(5.0)]);
//!
//!     engine.shutdown().await;
//! }
//! ```

mod engine;
pub mod error;
mod worker;

pub use engine::{EngineStats, EngineStatsSnapshot, LuaEngine, LuaEngineBuilder, LuaEngineHandle};
pub use error::{EngineError, EngineResult};

pub use otter_lua_core::{
    Bindings, FromLua, HostFunction, IntoLua, IntoLuaMulti, LightPointer, LuaConfig, LuaContext,
    LuaError, LuaResult, MultiValue, Value, Variadic,
};
