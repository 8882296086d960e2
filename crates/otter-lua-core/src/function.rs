//! Host callables exported to Lua.
//!
//! A [`HostFunction`] erases a typed Rust closure into a callable over
//! [`Value`]s plus the parameter descriptors the bridge uses to pull
//! arguments off the Lua stack.

use std::fmt;
use std::sync::Arc;

use crate::convert::{FromLua, HostReturn};
use crate::error::{LuaError, LuaResult};
use crate::types::TypeDesc;
use crate::value::Value;

type Callable = dyn Fn(Vec<Value>) -> LuaResult<Vec<Value>> + Send + Sync;

struct Inner {
    params: Vec<TypeDesc>,
    returns: usize,
    callable: Box<Callable>,
}

/// A type-erased host callable with a fixed signature
#[derive(Clone)]
pub struct HostFunction {
    inner: Arc<Inner>,
}

impl HostFunction {
    /// Wrap a typed Rust function or closure.
    ///
    /// # Example
    ///
    /// ```
    /// use otter_lua_core::HostFunction;
    ///
    /// let add = HostFunction::new(|a: i64, b: i64| a + b);
    /// assert_eq!(add.arity(), 2);
    /// assert_eq!(add.returns(), 1);
    /// ```
    pub fn new<F, Args, R>(f: F) -> Self
    where
        F: IntoHostFunction<Args, R>,
    {
        f.into_host_function()
    }

    /// Build from an explicit signature and a callable over values.
    ///
    /// The callable receives arguments already pulled against `params`.
    pub fn from_parts<F>(params: Vec<TypeDesc>, returns: usize, callable: F) -> Self
    where
        F: Fn(Vec<Value>) -> LuaResult<Vec<Value>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                params,
                returns,
                callable: Box::new(callable),
            }),
        }
    }

    pub fn params(&self) -> &[TypeDesc] {
        &self.inner.params
    }

    pub fn arity(&self) -> usize {
        self.inner.params.len()
    }

    pub fn returns(&self) -> usize {
        self.inner.returns
    }

    pub fn is_variadic(&self) -> bool {
        self.inner.params.iter().any(TypeDesc::contains_variadic)
    }

    /// Call with converted arguments.
    ///
    /// Fails if the argument count or the result count does not match the
    /// declared signature.
    pub fn invoke(&self, args: Vec<Value>) -> LuaResult<Vec<Value>> {
        if args.len() != self.arity() {
            return Err(LuaError::ArgumentCount {
                expected: self.arity(),
                actual: args.len(),
            });
        }
        let results = (self.inner.callable)(args)?;
        if results.len() != self.returns() {
            return Err(LuaError::internal(format!(
                "host function declared {} results but produced {}",
                self.returns(),
                results.len()
            )));
        }
        Ok(results)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Human-readable signature, e.g. `fn(i64, String) -> 1`
    pub fn signature(&self) -> String {
        let params = self
            .inner
            .params
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("fn({}) -> {}", params, self.inner.returns)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("params", &self.inner.params)
            .field("returns", &self.inner.returns)
            .finish_non_exhaustive()
    }
}

/// Rust functions that can become a [`HostFunction`].
///
/// Implemented for `Fn` closures of up to eight arguments whose parameters
/// implement [`FromLua`] and whose result implements [`HostReturn`].
pub trait IntoHostFunction<Args, R>: Send + Sync + 'static {
    fn into_host_function(self) -> HostFunction;
}

macro_rules! impl_into_host_function {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> IntoHostFunction<($($arg,)*), R> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: HostReturn,
            $($arg: FromLua,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_host_function(self) -> HostFunction {
                let params = vec![$(<$arg as FromLua>::type_desc()),*];
                HostFunction::from_parts(params, R::return_count(), move |args: Vec<Value>| {
                    let mut args = args.into_iter();
                    $(let $arg = <$arg as FromLua>::from_lua(args.next().unwrap_or_default())?;)*
                    (self)($($arg),*).into_returns()
                })
            }
        }
    };
}

impl_into_host_function!();
impl_into_host_function!(A1);
impl_into_host_function!(A1, A2);
impl_into_host_function!(A1, A2, A3);
impl_into_host_function!(A1, A2, A3, A4);
impl_into_host_function!(A1, A2, A3, A4, A5);
impl_into_host_function!(A1, A2, A3, A4, A5, A6);
impl_into_host_function!(A1, A2, A3, A4, A5, A6, A7);
impl_into_host_function!(A1, A2, A3, A4, A5, A6, A7, A8);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Variadic;

    #[test]
    fn test_typed_closure_signature() {
        let f = HostFunction::new(|name: String, count: u32| format!("{}:{}", name, count));
        assert_eq!(f.params(), &[TypeDesc::String, TypeDesc::U32]);
        assert_eq!(f.returns(), 1);
        assert_eq!(f.signature(), "fn(String, u32) -> 1");
    }

    #[test]
    fn test_invoke_converts_arguments() {
        let f = HostFunction::new(|a: i32, b: i32| (a + b, a * b));
        let out = f
            .invoke(vec![Value::Number(3.0), Value::Number(4.0)])
            .unwrap();
        assert_eq!(out, vec![Value::Number(7.0), Value::Number(12.0)]);
    }

    #[test]
    fn test_invoke_checks_arity() {
        let f = HostFunction::new(|_: i32, _: i32, _: i32| ());
        let err = f.invoke(vec![Value::Number(1.0)]).unwrap_err();
        assert!(matches!(
            err,
            LuaError::ArgumentCount {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_unit_function() {
        let f = HostFunction::new(|| ());
        assert_eq!(f.arity(), 0);
        assert_eq!(f.returns(), 0);
        assert!(f.invoke(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_variadic_detected() {
        let f = HostFunction::new(|_: Variadic<i32>| ());
        assert!(f.is_variadic());
        assert!(!HostFunction::new(|_: Vec<i32>| ()).is_variadic());
    }

    #[test]
    fn test_clone_shares_identity() {
        let f = HostFunction::new(|| 1);
        let g = f.clone();
        assert!(f.ptr_eq(&g));
        assert!(!f.ptr_eq(&HostFunction::new(|| 1)));
    }
}
