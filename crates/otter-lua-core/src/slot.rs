//! Per-context error slot for host function failures.
//!
//! Host functions run inside `lua_pcall` but must not raise Lua errors, so
//! their failures are parked here and picked up once the call returns.

use std::cell::RefCell;

use tracing::warn;

use crate::error::LuaError;

#[derive(Debug, Default)]
pub struct ErrorSlot {
    error: RefCell<Option<LuaError>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any stale error
    pub fn clear(&self) {
        self.error.borrow_mut().take();
    }

    /// Record a failure. The first one recorded wins.
    pub fn set(&self, error: LuaError) {
        let mut slot = self.error.borrow_mut();
        if slot.is_some() {
            warn!(dropped = %error, "Host function failure already recorded");
        } else {
            warn!(error = %error, "Host function failed");
            *slot = Some(error);
        }
    }

    pub fn take(&self) -> Option<LuaError> {
        self.error.borrow_mut().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_wins() {
        let slot = ErrorSlot::new();
        slot.set(LuaError::callback("first"));
        slot.set(LuaError::callback("second"));

        let err = slot.take().unwrap();
        assert_eq!(err.to_string(), "Callback error: first");
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_clear() {
        let slot = ErrorSlot::new();
        slot.set(LuaError::callback("stale"));
        slot.clear();
        assert!(slot.take().is_none());
    }
}
