//! Registry of host functions exported to a Lua state.
//!
//! Lua closures refer to host functions by integer id only. Entries are
//! append-only for the lifetime of the owning context, so an id captured by
//! a live closure always resolves.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::function::HostFunction;

/// A host function together with its id and display name
#[derive(Debug)]
pub struct RegisteredFunction {
    pub id: u32,
    pub name: String,
    pub function: HostFunction,
}

/// Append-only table of exported host functions
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: RwLock<Vec<Arc<RegisteredFunction>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function and return its id
    pub fn register(&self, name: impl Into<String>, function: HostFunction) -> u32 {
        let name = name.into();
        let mut functions = self.functions.write();
        let id = functions.len() as u32;

        debug!(
            id,
            name = %name,
            arity = function.arity(),
            returns = function.returns(),
            "Registering host function"
        );

        functions.push(Arc::new(RegisteredFunction { id, name, function }));
        id
    }

    /// Look up a function by id.
    ///
    /// The entry is cloned out so no lock is held while it runs.
    pub fn get(&self, id: u32) -> Option<Arc<RegisteredFunction>> {
        self.functions.read().get(id as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }

    /// Names of all registered functions, in id order
    pub fn names(&self) -> Vec<String> {
        self.functions
            .read()
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }
}
