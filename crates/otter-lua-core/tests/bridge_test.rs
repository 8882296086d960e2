//! Integration tests for setting globals, evaluation and calls

use otter_lua_core::{
    Bindings, HostFunction, LightPointer, LuaContext, LuaError, MultiValue, Value, Variadic,
};

fn lua() -> LuaContext {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    LuaContext::new().unwrap()
}

#[test]
fn test_new_and_close() {
    let lua = lua();
    lua.close();
}

#[test]
fn test_set_namespace() {
    let lua = lua();
    lua.try_set("foo.bar.baz", HostFunction::new(|| ())).unwrap();

    let out = lua
        .try_eval("return type(foo), type(foo.bar), type(foo.bar.baz)")
        .unwrap();
    assert_eq!(
        out,
        vec![
            Value::String("table".into()),
            Value::String("table".into()),
            Value::String("function".into())
        ]
    );

    let err = lua.try_set("foo.bar.baz.qux", 1).unwrap_err();
    match err {
        LuaError::NamespaceConflict { path } => assert_eq!(path, "foo.bar.baz"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_set_bad_global_namespace() {
    let lua = lua();
    lua.set("i", 5);
    let err = lua.try_set("i.foo", 5).unwrap_err();
    assert_eq!(err.to_string(), "namespace i is not a table");

    lua.set("a.b", 5);
    assert!(lua.try_set("a.b.c", 5).is_err());
}

#[test]
fn test_set_invalid_name() {
    let lua = lua();
    assert_eq!(lua.try_set("", 1).unwrap_err().kind(), "InvalidNameError");
    assert_eq!(lua.try_set("a..b", 1).unwrap_err().kind(), "InvalidNameError");
}

#[test]
fn test_set_variadic_rejected_before_mutation() {
    let lua = lua();
    let err = lua
        .try_set("ns.foo", HostFunction::new(|_: Variadic<i32>| ()))
        .unwrap_err();
    assert_eq!(err.kind(), "UnsupportedTypeError");
    assert!(lua.registry().is_empty());
    assert_eq!(lua.eval("return ns"), vec![Value::Nil]);
}

#[test]
fn test_set_all() {
    let lua = lua();
    let bindings = Bindings::new()
        .bind("x", 1)
        .unwrap()
        .bind("cfg.name", "otter")
        .unwrap();
    lua.set_all(bindings);

    let out = lua.eval("return x, cfg.name");
    assert_eq!(
        out,
        vec![Value::Number(1.0), Value::String("otter".into())]
    );
}

#[test]
fn test_numeric_types_read_back_as_f64() {
    let lua = lua();
    lua.set("a", 42i8);
    lua.set("b", 42i16);
    lua.set("c", 42i32);
    lua.set("d", 42i64);
    lua.set("e", 42isize);
    lua.set("f", 42u8);
    lua.set("g", 42u16);
    lua.set("h", 42u32);
    lua.set("i", 42u64);
    lua.set("j", 42usize);
    lua.set("k", 42f32);
    lua.set("l", 42f64);

    let out = lua.eval("return a, b, c, d, e, f, g, h, i, j, k, l");
    assert_eq!(out.len(), 12);
    for value in out {
        assert_eq!(value, Value::Number(42.0));
    }
}

#[test]
fn test_set_scalars() {
    let lua = lua();
    lua.set("T", true);
    lua.set("F", false);
    lua.set("S", "foobarbaz");
    lua.set("N", Value::Nil);

    let out = lua.eval("return T, F, S, N");
    assert_eq!(
        out,
        vec![
            Value::Boolean(true),
            Value::Boolean(false),
            Value::String("foobarbaz".into()),
            Value::Nil
        ]
    );
}

#[test]
fn test_set_slices() {
    let lua = lua();
    lua.set("Ints", vec![5, 3, 2, 1, 4]);
    lua.eval(
        r#"
        assert(#Ints == 5)
        assert(Ints[1] == 5 and Ints[2] == 3 and Ints[3] == 2)
        assert(Ints[4] == 1 and Ints[5] == 4)
        "#,
    );

    lua.set(
        "Vals",
        vec![
            Value::String("foobar".into()),
            Value::Number(42.0),
            Value::Boolean(true),
        ],
    );
    lua.eval("assert(Vals[1] == 'foobar' and Vals[2] == 42 and Vals[3] == true)");
}

#[test]
fn test_set_map_and_bytes() {
    let lua = lua();
    let mut scores = std::collections::BTreeMap::new();
    scores.insert("a", 1);
    scores.insert("b", 2);
    lua.set("scores", scores);
    lua.set("raw", Value::Bytes(b"a\0b".to_vec()));

    let out = lua.eval("return scores.a + scores.b, #raw");
    assert_eq!(out, vec![Value::Number(3.0), Value::Number(3.0)]);
}

#[test]
fn test_set_pointer() {
    let lua = lua();
    let mut i = 42i32;
    lua.set("P", LightPointer::new(&mut i as *mut i32));

    let out = lua.eval("return P");
    let ptr = out[0].as_pointer().unwrap();
    assert_eq!(unsafe { *ptr.cast::<i32>() }, 42);
}

#[test]
fn test_host_function_arguments_and_returns() {
    let lua = lua();
    lua.set(
        "baz",
        HostFunction::new(|i: i32, s: String, b: bool| (i, s, b)),
    );
    lua.eval(
        r#"
        local i, s, b = baz(42, 'foobar', true)
        if i ~= 42 then error('i is not 42') end
        if s ~= 'foobar' then error('s is not foobar') end
        if b ~= true then error('b is not true') end
        "#,
    );
}

#[test]
fn test_host_function_arity_mismatch() {
    let lua = lua();
    lua.set("bar", HostFunction::new(|_: i32, _: String, _: bool| ()));

    let err = lua
        .try_eval(
            r#"
            (function()
                (function()
                    bar(42)
                end)()
            end)()
            "#,
        )
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("number of arguments not match"), "{message}");
    assert!(message.contains("stack traceback:"), "{message}");
    assert!(!err.traceback().unwrap_or_default().is_empty());
    assert!(matches!(
        err.cause(),
        Some(LuaError::ArgumentCount {
            expected: 3,
            actual: 1
        })
    ));
}

#[test]
fn test_runtime_error_has_traceback() {
    let lua = lua();
    let err = lua
        .try_eval(
            r#"
            (function()
                (function()
                    error('Error, Error, Error.')
                end)()
            end)()
            "#,
        )
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("Error, Error, Error."), "{message}");
    assert!(message.contains("stack traceback:"), "{message}");
    assert!(err.cause().is_none());
}

#[test]
fn test_eval_errors() {
    let lua = lua();
    assert_eq!(lua.try_eval("foobar 1, 2, 3").unwrap_err().kind(), "LoadError");

    let err = lua.try_eval("error(42)").unwrap_err();
    assert_eq!(err.kind(), "CallError");
    assert!(err.to_string().contains("42"));

    let err = lua.try_eval("error({})").unwrap_err();
    assert!(err.to_string().contains("error object is a table value"));
}

#[test]
fn test_eval_returns() {
    let lua = lua();
    assert_eq!(lua.eval("return 42"), vec![Value::Number(42.0)]);
    assert!(lua.eval("local x = 1").is_empty());
    assert_eq!(
        lua.eval("return 'foobar', 42, true"),
        vec![
            Value::String("foobar".into()),
            Value::Number(42.0),
            Value::Boolean(true)
        ]
    );
}

#[test]
fn test_eval_bindings_do_not_leak() {
    let lua = lua();
    let out = lua.eval_with("return V", Bindings::new().bind("V", 42).unwrap());
    assert_eq!(out, vec![Value::Number(42.0)]);

    lua.set("foo", 42);
    let out = lua.eval_with("return foo + bar", Bindings::new().bind("bar", 42).unwrap());
    assert_eq!(out, vec![Value::Number(84.0)]);

    assert_eq!(lua.eval("return bar"), vec![Value::Nil]);
}

#[test]
fn test_eval_bindings_see_and_write_globals() {
    let lua = lua();
    lua.set("counter", 1);
    lua.eval_with(
        "counter = counter + step; fresh = true",
        Bindings::new().bind("step", 2).unwrap(),
    );

    assert_eq!(
        lua.eval("return counter, fresh, step"),
        vec![Value::Number(3.0), Value::Boolean(true), Value::Nil]
    );
}

#[test]
fn test_eval_flat_bindings() {
    let lua = lua();
    let err = Bindings::from_flat(vec![Value::String("foo".into())]).unwrap_err();
    assert!(err.to_string().contains("number of arguments not match"));

    let err = Bindings::from_flat(vec![Value::Number(42.0), Value::Number(42.0)]).unwrap_err();
    assert!(err.to_string().contains("name must be string"));

    let bindings =
        Bindings::from_flat(vec![Value::String("T".into()), Value::String("你好".into())]).unwrap();
    assert_eq!(
        lua.eval_with("return T", bindings),
        vec![Value::String("你好".into())]
    );
}

#[test]
fn test_call() {
    let lua = lua();
    lua.set(
        "foo",
        HostFunction::new(|i: i32, s: String, b: bool| (b, i, s)),
    );

    let out = lua.try_call("foo", (42, "foobar", true)).unwrap();
    assert_eq!(
        out,
        vec![
            Value::Boolean(true),
            Value::Number(42.0),
            Value::String("foobar".into())
        ]
    );

    assert!(lua.try_call("foo", 42).is_err());
    assert!(lua.try_call("foo", (true, 42, "justwe")).is_err());

    let err = lua.try_call("bar", ()).unwrap_err();
    assert_eq!(err.to_string(), "bar is not a function");
    let err = lua.try_call("foo.bar.baz", ()).unwrap_err();
    assert_eq!(err.kind(), "NotAFunctionError");
}

#[test]
fn test_call_lua_functions() {
    let lua = lua();
    lua.eval(
        r#"
        baz = {
            bar = {
                foo = function() error('foo error') end,
                bar = function(n) return n * 2 end,
            }
        }
        function get() return 42 end
        function set(n) return n * 2 end
        "#,
    );

    let err = lua.try_call("baz.bar.foo", ()).unwrap_err();
    assert!(err.to_string().contains("foo error"));
    assert!(err.traceback().is_some());

    assert_eq!(lua.call("baz.bar.bar", 42), vec![Value::Number(84.0)]);

    let got = lua.call("get", ());
    assert_eq!(
        lua.call("set", got[0].clone()),
        vec![Value::Number(84.0)]
    );
}

#[test]
fn test_call_resolves_through_index_metamethod() {
    let lua = lua();
    lua.eval(
        r#"
        Base = { greet = function() return 'hi' end }
        obj = setmetatable({}, { __index = Base })
        app = setmetatable({}, { __index = function(_, k) return { name = k } end })
        "#,
    );

    assert_eq!(lua.eval("return obj.greet()"), vec![Value::String("hi".into())]);
    assert_eq!(lua.call("obj.greet", ()), vec![Value::String("hi".into())]);
    assert_eq!(lua.get::<String>("app.config.name"), "config");
}

#[test]
fn test_call_faulting_index_metamethod() {
    let lua = lua();
    lua.eval("trap = setmetatable({}, { __index = function() error('no such field') end })");

    let err = lua.try_call("trap.run", ()).unwrap_err();
    assert_eq!(err.kind(), "CallError");
    assert!(err.to_string().contains("no such field"), "{err}");

    let err = lua.try_get::<Value>("trap.value").unwrap_err();
    assert_eq!(err.kind(), "CallError");

    // non-table intermediates still fail as before
    lua.set("n", 1);
    assert_eq!(lua.try_call("n.f", ()).unwrap_err().kind(), "NotAFunctionError");
    assert_eq!(lua.eval("return 1"), vec![Value::Number(1.0)]);
}

#[test]
fn test_call_with_many_arguments() {
    let lua = lua();
    lua.eval(
        r#"
        function all42(...)
            local n = select('#', ...)
            for i, v in ipairs({...}) do
                if v ~= 42 then error('not 42') end
            end
            return n
        end
        "#,
    );

    let args: MultiValue = std::iter::repeat_n(Value::Number(42.0), 12).collect();
    assert_eq!(lua.call("all42", args), vec![Value::Number(12.0)]);
}

#[test]
fn test_host_function_err_return() {
    let lua = lua();
    lua.set(
        "checked",
        HostFunction::new(|n: i32| {
            if n < 0 {
                Err(format!("negative input {}", n))
            } else {
                Ok(n * 2)
            }
        }),
    );

    assert_eq!(lua.eval("return checked(4)"), vec![Value::Number(8.0)]);

    let err = lua.try_eval("return checked(-1)").unwrap_err();
    assert!(err.to_string().contains("negative input -1"));
    assert!(matches!(err.cause(), Some(LuaError::Callback { .. })));
    assert!(err.traceback().is_some());
}

#[test]
fn test_host_function_panic_is_reported() {
    let lua = lua();
    lua.set(
        "explode",
        HostFunction::new(|| -> i32 { panic!("kaboom") }),
    );

    let err = lua.try_eval("return explode()").unwrap_err();
    assert!(err.to_string().contains("kaboom"));

    // The context stays usable afterwards.
    assert_eq!(lua.eval("return 1"), vec![Value::Number(1.0)]);
}

#[test]
fn test_first_host_failure_wins() {
    let lua = lua();
    lua.set("one", HostFunction::new(|_: i32| ()));

    let err = lua.try_eval("one(); one(1, 2)").unwrap_err();
    assert!(matches!(
        err.cause(),
        Some(LuaError::ArgumentCount {
            expected: 1,
            actual: 0
        })
    ));
}

#[test]
fn test_host_failure_wins_over_later_runtime_error() {
    let lua = lua();
    lua.set("half", HostFunction::new(|n: f64| n / 2.0));

    let err = lua.try_eval("local x = half() + 1").unwrap_err();
    assert!(err.to_string().contains("half: number of arguments not match"));
    assert!(matches!(err.cause(), Some(LuaError::ArgumentCount { .. })));
}

#[test]
fn test_host_failure_traceback_without_stdlib() {
    let lua = LuaContext::with_config(otter_lua_core::LuaConfig::bare()).unwrap();
    lua.set("one", HostFunction::new(|n: i32| n));

    let err = lua.try_eval("return one()").unwrap_err();
    let traceback = err.traceback().unwrap_or_default();
    assert!(traceback.starts_with("stack traceback:"), "{traceback}");
}

#[test]
fn test_host_failure_is_not_sticky() {
    let lua = lua();
    lua.set("one", HostFunction::new(|n: i32| n));
    assert!(lua.try_eval("one()").is_err());
    assert_eq!(lua.eval("return one(5)"), vec![Value::Number(5.0)]);
}

#[test]
fn test_returned_functions_are_exported() {
    let lua = lua();
    lua.set(
        "adder",
        HostFunction::new(|n: f64| HostFunction::new(move |x: f64| x + n)),
    );

    assert_eq!(lua.eval("return adder(2)(3)"), vec![Value::Number(5.0)]);
    assert_eq!(lua.registry().len(), 2);
}

#[test]
#[should_panic(expected = "none is not a function")]
fn test_call_panics_in_convenience_tier() {
    lua().call("none", ());
}

#[test]
#[should_panic(expected = "number of arguments not match")]
fn test_eval_panics_in_convenience_tier() {
    let lua = lua();
    lua.set("foo", HostFunction::new(|_: i32| ()));
    lua.eval("foo()");
}

#[test]
#[should_panic(expected = "namespace")]
fn test_set_panics_in_convenience_tier() {
    let lua = lua();
    lua.set("x", 1);
    lua.set("x.y", 1);
}

#[test]
fn test_unicode() {
    let lua = lua();
    lua.set("greeting", "héllo, 世界");
    assert_eq!(
        lua.eval("return greeting, #greeting"),
        vec![
            Value::String("héllo, 世界".into()),
            Value::Number("héllo, 世界".len() as f64)
        ]
    );
}
